//! Storage module for the session directory
//!
//! This module provides configuration, initialization and health checks for
//! the directory that holds one JSON file per persisted session. The root is
//! always injected, never hardcoded at the call sites.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};

/// Storage configuration struct
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the session files
    pub sessions_dir: PathBuf,
}

impl StorageConfig {
    /// Create a new StorageConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SESSIONS_DIR`: session directory (default: "./data/sessions")
    pub fn from_env() -> StorageResult<Self> {
        let sessions_dir = env::var("SESSIONS_DIR").unwrap_or_else(|_| "./data/sessions".to_string());

        if sessions_dir.trim().is_empty() {
            return Err(StorageError::Configuration(
                "SESSIONS_DIR must not be empty".to_string(),
            ));
        }

        Ok(Self {
            sessions_dir: PathBuf::from(sessions_dir),
        })
    }

    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }
}

/// Create the storage root if needed and verify it is writable
///
/// # Arguments
///
/// * `config` - Storage configuration
///
/// # Returns
///
/// * `StorageResult<PathBuf>` - The ready-to-use root or a fatal error
pub async fn init_root(config: &StorageConfig) -> StorageResult<PathBuf> {
    let root = config.sessions_dir.clone();
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| StorageError::io(&root, e))?;

    if !health_check(&root).await? {
        return Err(StorageError::NotWritable(root));
    }

    info!("Storage root ready at {}", root.display());
    Ok(root)
}

/// Check that a file can be created and removed under the root
///
/// # Arguments
///
/// * `root` - Storage root directory
///
/// # Returns
///
/// * `StorageResult<bool>` - True if the root accepts writes
pub async fn health_check(root: &Path) -> StorageResult<bool> {
    let probe = root.join(format!(".probe-{}", uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&probe, b"ok").await {
        warn!("Storage probe write failed at {}: {}", probe.display(), e);
        return Ok(false);
    }

    tokio::fs::remove_file(&probe)
        .await
        .map_err(|e| StorageError::io(&probe, e))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_storage_config_from_env() {
        unsafe { env::remove_var("SESSIONS_DIR") };
        let config = StorageConfig::from_env().expect("Failed to create storage config");
        assert_eq!(config.sessions_dir, PathBuf::from("./data/sessions"));
    }

    #[test]
    #[serial]
    fn test_storage_config_rejects_blank_dir() {
        unsafe { env::set_var("SESSIONS_DIR", "  ") };
        let result = StorageConfig::from_env();
        unsafe { env::remove_var("SESSIONS_DIR") };
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_init_root_creates_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(tmp.path().join("data").join("sessions"));

        let root = init_root(&config).await.unwrap();
        assert!(root.is_dir());
        assert!(health_check(&root).await.unwrap());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_health_check_fails_for_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(!health_check(&missing).await.unwrap());
    }
}
