//! Common library for the keystroke/emotion capture workspace
//!
//! This crate holds the canonical data model shared by the capture client
//! and the API service: the emotion vocabulary and its boundary mappings,
//! keystroke interval events, the persisted session record, text
//! sanitization and the storage-root configuration.

pub mod emotion;
pub mod error;
pub mod keystroke;
pub mod sanitize;
pub mod session;
pub mod storage;

pub use emotion::{Emotion, EmotionSample, ManualEmotionVector};
pub use keystroke::{IntervalKind, KeystrokeEvent};
pub use session::{Context, DetectionType, DeviceInfo, Emotions, Session, TypingMode};

/// Minimum number of characters a session text must contain
pub const MIN_TEXT_CHARS: usize = 10;

/// Value stored in `musicId` when no music was playing
pub const NO_MUSIC: &str = "None";
