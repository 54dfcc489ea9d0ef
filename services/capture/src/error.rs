//! Custom error types for the capture client

use common::error::StorageError;
use thiserror::Error;

/// Errors raised while composing a session from captured input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    /// Fewer characters than the minimum were typed
    #[error("Please type at least {min} characters before saving (got {actual})")]
    TooShortInput { min: usize, actual: usize },

    /// Every manual emotion is still at zero
    #[error("Please select at least one emotion before saving")]
    NoEmotionSelected,

    /// Webcam mode with an empty timeline and no forced emotion
    #[error("No emotion was detected; pick one manually before saving")]
    NoEmotionDetected,

    /// Fixed-phrase mode and the typed text differs from the phrase
    #[error("Please copy the displayed phrase exactly")]
    PhraseMismatch,

    /// Manual input given for the webcam context or the other way around
    #[error("Emotion input does not match context {0}")]
    EmotionSourceMismatch(String),
}

/// Errors from the manual emotion source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmotionError {
    #[error("Unknown emotion: {0}")]
    UnknownEmotion(String),
}

/// Errors from the capture device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the automatic emotion detector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Detection models failed to load: {0}")]
    ModelLoad(String),

    #[error("Detection models did not load within {0} ms")]
    ModelLoadTimeout(u128),

    #[error("Detection models are unavailable")]
    ModelUnavailable,

    #[error("Detector cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("Detection failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Errors from the network transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server rejected the session ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Errors from the persistence client
///
/// Only raised when even the local fallback failed.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Local fallback storage failed: {0}")]
    Local(#[from] StorageError),
}

/// Errors from the per-device identity
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Consent is required before a user id is assigned")]
    ConsentRequired,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced by a save request
#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
