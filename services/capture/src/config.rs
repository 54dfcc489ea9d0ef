//! Capture client configuration

use std::time::Duration;

use anyhow::Result;

use crate::emotion::DetectionConfig;
use crate::local_store::LocalStoreConfig;

/// Configuration of the capture client
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Base URL of the API service
    pub server_url: String,
    /// Probe the server before each save
    pub probe_server: bool,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    /// Period of the typing-speed updates
    pub speed_update_period: Duration,
    pub local_store: LocalStoreConfig,
    pub detection: DetectionConfig,
}

impl CaptureConfig {
    /// Create a new CaptureConfig from environment variables
    ///
    /// # Environment Variables
    /// - `CAPTURE_SERVER_URL`: API base URL (default: "http://localhost:3001")
    /// - `CAPTURE_PROBE_SERVER`: probe before saving (default: true)
    /// - `CAPTURE_PROBE_TIMEOUT_MS`: probe timeout (default: 2000)
    /// - `CAPTURE_REQUEST_TIMEOUT_MS`: save request timeout (default: 10000)
    /// - `CAPTURE_SPEED_UPDATE_MS`: typing-speed refresh period (default: 1000)
    /// - `CAPTURE_LOCAL_DIR`: local fallback directory (default: "./data/local")
    /// - `CAPTURE_MODEL_LOCATION`: detector model location (default: "/models/face-api-models")
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("CAPTURE_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:3001".to_string());

        let probe_server = std::env::var("CAPTURE_PROBE_SERVER")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let probe_timeout = millis_from_env("CAPTURE_PROBE_TIMEOUT_MS", 2000);
        let request_timeout = millis_from_env("CAPTURE_REQUEST_TIMEOUT_MS", 10_000);
        let speed_update_period = millis_from_env("CAPTURE_SPEED_UPDATE_MS", 1000);

        let mut detection = DetectionConfig::default();
        if let Ok(location) = std::env::var("CAPTURE_MODEL_LOCATION") {
            detection.model_location = location;
        }

        Ok(Self {
            server_url,
            probe_server,
            probe_timeout,
            request_timeout,
            speed_update_period,
            local_store: LocalStoreConfig::from_env()?,
            detection,
        })
    }
}

fn millis_from_env(name: &str, default: u64) -> Duration {
    let millis = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_capture_config_defaults() {
        unsafe {
            std::env::remove_var("CAPTURE_SERVER_URL");
            std::env::remove_var("CAPTURE_PROBE_SERVER");
            std::env::remove_var("CAPTURE_PROBE_TIMEOUT_MS");
        }
        let config = CaptureConfig::from_env().expect("Failed to create capture config");

        assert_eq!(config.server_url, "http://localhost:3001");
        assert!(config.probe_server);
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_capture_config_reads_overrides() {
        unsafe {
            std::env::set_var("CAPTURE_PROBE_SERVER", "false");
            std::env::set_var("CAPTURE_PROBE_TIMEOUT_MS", "250");
        }
        let config = CaptureConfig::from_env().expect("Failed to create capture config");
        unsafe {
            std::env::remove_var("CAPTURE_PROBE_SERVER");
            std::env::remove_var("CAPTURE_PROBE_TIMEOUT_MS");
        }

        assert!(!config.probe_server);
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
    }
}
