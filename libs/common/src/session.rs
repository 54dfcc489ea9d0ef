//! Session record and its enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::emotion::{EmotionSample, ManualEmotionVector};
use crate::keystroke::KeystrokeEvent;

/// Capture mode a session was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Context {
    Manual,
    ManualFixed,
    Music,
    MusicFixed,
    Webcam,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Manual => "manual",
            Context::ManualFixed => "manual-fixed",
            Context::Music => "music",
            Context::MusicFixed => "music-fixed",
            Context::Webcam => "webcam",
        }
    }

    /// The user copies a displayed phrase instead of typing freely
    pub fn is_fixed(&self) -> bool {
        matches!(self, Context::ManualFixed | Context::MusicFixed)
    }

    pub fn is_music(&self) -> bool {
        matches!(self, Context::Music | Context::MusicFixed)
    }

    /// Emotions come from the sliders rather than from the camera
    pub fn requires_manual_emotions(&self) -> bool {
        !matches!(self, Context::Webcam)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Context {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Context::Manual),
            "manual-fixed" => Ok(Context::ManualFixed),
            "music" => Ok(Context::Music),
            "music-fixed" => Ok(Context::MusicFixed),
            "webcam" => Ok(Context::Webcam),
            other => Err(format!("Unknown context: {}", other)),
        }
    }
}

/// Where the emotion labels came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Manual,
    Automatic,
}

/// Free text or copy of a fixed phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingMode {
    Free,
    Fixed,
}

/// Client device description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub screen: String,
}

impl DeviceInfo {
    /// Describe the machine the process runs on
    pub fn current() -> Self {
        Self {
            browser: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            os: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            screen: "unknown".to_string(),
        }
    }
}

/// Emotion payload: slider percentages or a detection timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Emotions {
    Timeline(Vec<EmotionSample>),
    Manual(ManualEmotionVector),
}

impl Emotions {
    pub fn detection_type(&self) -> DetectionType {
        match self {
            Emotions::Timeline(_) => DetectionType::Automatic,
            Emotions::Manual(_) => DetectionType::Manual,
        }
    }

    /// Timeline form, empty for manual vectors
    pub fn timeline(&self) -> Vec<EmotionSample> {
        match self {
            Emotions::Timeline(samples) => samples.clone(),
            Emotions::Manual(_) => Vec::new(),
        }
    }
}

/// Canonical persisted session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    pub context: Context,
    pub text: String,
    pub timings: Vec<f64>,
    pub keystroke_data: Vec<KeystrokeEvent>,
    pub emotions: Emotions,
    pub emotion_timeline: Vec<EmotionSample>,
    pub session_duration: f64,
    pub keystroke_count: u32,
    #[serde(default)]
    pub typing_speed: f64,
    pub camera_active: bool,
    pub music_id: String,
    pub device_info: DeviceInfo,
    pub timestamp: DateTime<Utc>,
    pub detection_type: DetectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_mode: Option<TypingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_text: Option<String>,
}
