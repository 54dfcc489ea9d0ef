//! Custom error types for the common library
//!
//! This module defines the storage error type used by every durable store
//! in the workspace (the server session directory and the client-side
//! local fallback store).

use std::path::PathBuf;

use thiserror::Error;

/// Custom error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage root exists but cannot be written to
    #[error("Storage root is not writable: {0}")]
    NotWritable(PathBuf),

    /// Configuration error
    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;
