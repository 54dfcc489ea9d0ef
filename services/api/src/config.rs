//! Server configuration
//!
//! Values come from `API_*` environment variables layered over defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::validation::ValidationMode;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub sessions_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    /// `lenient` or `strict`
    pub validation_mode: String,
    /// Lifetime of an admin session cookie
    pub admin_session_hours: u64,
}

impl ApiConfig {
    /// Load from the environment
    ///
    /// # Environment Variables
    /// - `API_PORT` (default: 3001)
    /// - `API_SESSIONS_DIR` (default: "./data/sessions")
    /// - `API_ADMIN_USERNAME` / `API_ADMIN_PASSWORD` (default: admin / admin123)
    /// - `API_VALIDATION_MODE` (default: lenient)
    /// - `API_ADMIN_SESSION_HOURS` (default: 8)
    pub fn from_env() -> Result<Self> {
        let config: ApiConfig = config::Config::builder()
            .set_default("port", 3001)?
            .set_default("sessions_dir", "./data/sessions")?
            .set_default("admin_username", "admin")?
            .set_default("admin_password", "admin123")?
            .set_default("validation_mode", "lenient")?
            .set_default("admin_session_hours", 8)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()
            .context("Failed to read API configuration")?
            .try_deserialize()
            .context("Invalid API configuration")?;

        config.mode()?;
        if config.admin_session_hours == 0 {
            anyhow::bail!("API_ADMIN_SESSION_HOURS must be positive");
        }

        Ok(config)
    }

    pub fn mode(&self) -> Result<ValidationMode> {
        self.validation_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    pub fn admin_session_ttl(&self) -> Duration {
        Duration::from_secs(self.admin_session_hours * 3600)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            sessions_dir: PathBuf::from("./data/sessions"),
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
            validation_mode: ValidationMode::Lenient.to_string(),
            admin_session_hours: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 4] = [
        "API_PORT",
        "API_SESSIONS_DIR",
        "API_VALIDATION_MODE",
        "API_ADMIN_SESSION_HOURS",
    ];

    fn clear() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.sessions_dir, PathBuf::from("./data/sessions"));
        assert_eq!(config.mode().unwrap(), ValidationMode::Lenient);
        assert_eq!(config.admin_session_ttl(), Duration::from_secs(8 * 3600));
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear();
        unsafe {
            env::set_var("API_PORT", "4000");
            env::set_var("API_VALIDATION_MODE", "strict");
        }
        let config = ApiConfig::from_env();
        clear();

        let config = config.unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.mode().unwrap(), ValidationMode::Strict);
    }

    #[test]
    #[serial]
    fn test_unknown_mode_is_rejected() {
        clear();
        unsafe { env::set_var("API_VALIDATION_MODE", "paranoid") };
        let result = ApiConfig::from_env();
        clear();
        assert!(result.is_err());
    }
}
