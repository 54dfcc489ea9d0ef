//! Local key/value store for the capture client
//!
//! Stands in for browser local storage: every key maps to one file under
//! an injected root. Writes go through a temporary file and a rename so a
//! crash never leaves a half-written record behind.

use std::env;
use std::path::{Path, PathBuf};

use common::error::{StorageError, StorageResult};
use common::sanitize::sanitize_key;
use tracing::{debug, info};

const RECORD_EXTENSION: &str = "json";

/// Configuration for the local store
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Directory holding one file per key
    pub root: PathBuf,
}

impl LocalStoreConfig {
    /// Create a new LocalStoreConfig from environment variables
    ///
    /// # Environment Variables
    /// - `CAPTURE_LOCAL_DIR`: store directory (default: "./data/local")
    pub fn from_env() -> StorageResult<Self> {
        let root = env::var("CAPTURE_LOCAL_DIR").unwrap_or_else(|_| "./data/local".to_string());

        if root.trim().is_empty() {
            return Err(StorageError::Configuration(
                "CAPTURE_LOCAL_DIR must not be empty".to_string(),
            ));
        }

        Ok(Self {
            root: PathBuf::from(root),
        })
    }
}

/// File-backed key/value store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open the store, creating the root directory if needed
    pub async fn new(config: &LocalStoreConfig) -> StorageResult<Self> {
        tokio::fs::create_dir_all(&config.root)
            .await
            .map_err(|e| StorageError::io(&config.root, e))?;
        info!("Local store opened at {}", config.root.display());

        Ok(Self {
            root: config.root.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", sanitize_key(key), RECORD_EXTENSION))
    }

    /// Store `value` under `key`, replacing any previous value
    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        let tmp = self
            .root
            .join(format!(".{}.tmp-{}", sanitize_key(key), uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        debug!("Stored local record {}", key);
        Ok(())
    }

    /// Get the value stored under `key`
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Delete `key`; deleting a missing key is not an error
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// All keys starting with `prefix`, sorted
    pub async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) {
                if !key.starts_with('.') && key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Check that the root accepts writes
    pub async fn health_check(&self) -> StorageResult<bool> {
        common::storage::health_check(&self.root).await
    }
}
