//! Keystroke interval events

use serde::{Deserialize, Serialize};

/// The four interval classes measured between keyboard actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalKind {
    /// Between two consecutive key presses
    PressPress,
    /// How long a key was held
    PressRelease,
    /// Between two consecutive key releases
    ReleaseRelease,
    /// Between a release and the next press
    ReleasePress,
}

/// One interval measurement. `time_ms` is a duration, never a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeEvent {
    #[serde(rename = "type")]
    pub kind: IntervalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub time_ms: f64,
}

impl KeystrokeEvent {
    /// Interval between two keys (press-press, release-release, release-press)
    pub fn between(kind: IntervalKind, key1: &str, key2: &str, time_ms: f64) -> Self {
        Self {
            kind,
            key1: Some(key1.to_string()),
            key2: Some(key2.to_string()),
            key: None,
            time_ms: time_ms.max(0.0),
        }
    }

    /// Hold time of a single key
    pub fn hold(key: &str, time_ms: f64) -> Self {
        Self {
            kind: IntervalKind::PressRelease,
            key1: None,
            key2: None,
            key: Some(key.to_string()),
            time_ms: time_ms.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = KeystrokeEvent::between(IntervalKind::ReleasePress, "a", "b", 42.5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "release-press");
        assert_eq!(json["key1"], "a");
        assert_eq!(json["timeMs"], 42.5);
        assert!(json.get("key").is_none());
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        assert_eq!(KeystrokeEvent::hold("x", -3.0).time_ms, 0.0);
    }
}
