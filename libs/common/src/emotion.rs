//! Emotion vocabulary and emotion records
//!
//! The canonical vocabulary is the [`Emotion`] enum. Every external
//! vocabulary (UI slider keys, detector labels, stored payloads) goes
//! through the mapping functions in this module so that raw third-party
//! names never reach the canonical schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical emotion vocabulary
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    #[serde(alias = "anger")]
    Angry,
    #[serde(alias = "fear")]
    Fearful,
    #[serde(alias = "disgust")]
    Disgusted,
    #[serde(alias = "surprise")]
    Surprised,
    Neutral,
}

impl Emotion {
    /// Every canonical emotion, in schema order
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Surprised,
    ];

    /// Canonical name as stored in sessions
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
        }
    }

    /// Key used by the manual slider vocabulary
    pub fn ui_key(&self) -> &'static str {
        match self {
            Emotion::Angry => "anger",
            Emotion::Fearful => "fear",
            Emotion::Disgusted => "disgust",
            Emotion::Surprised => "surprise",
            other => other.as_str(),
        }
    }

    /// Map any known vocabulary (canonical, UI or detector) to the enum
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "happy" | "happiness" | "joy" => Some(Emotion::Happy),
            "sad" | "sadness" => Some(Emotion::Sad),
            "angry" | "anger" => Some(Emotion::Angry),
            "fearful" | "fear" => Some(Emotion::Fearful),
            "disgusted" | "disgust" => Some(Emotion::Disgusted),
            "surprised" | "surprise" => Some(Emotion::Surprised),
            "neutral" => Some(Emotion::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a detector confidence (0.0..=1.0) to an integer percentage
pub fn confidence_to_percent(confidence: f32) -> u8 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// A single point of the emotion timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSample {
    /// Offset from the session start in milliseconds
    pub timestamp: f64,
    pub emotion: Emotion,
    /// Confidence of `emotion`, 0-100
    pub score: u8,
    pub all_emotions: BTreeMap<Emotion, u8>,
}

impl EmotionSample {
    /// Build a sample from a full score map, keeping the arg-max emotion
    ///
    /// Returns `None` for an empty map.
    pub fn from_scores(timestamp: f64, all_emotions: BTreeMap<Emotion, u8>) -> Option<Self> {
        let (emotion, score) = all_emotions
            .iter()
            .max_by_key(|(_, score)| **score)
            .map(|(emotion, score)| (*emotion, *score))?;

        Some(Self {
            timestamp,
            emotion,
            score,
            all_emotions,
        })
    }

    /// Synthesize a sample concentrated on a single emotion
    pub fn forced(timestamp: f64, emotion: Emotion, score: u8) -> Self {
        let score = score.min(100);
        let all_emotions = Emotion::ALL
            .iter()
            .map(|e| (*e, if *e == emotion { score } else { 0 }))
            .collect();

        Self {
            timestamp,
            emotion,
            score,
            all_emotions,
        }
    }
}

/// Percentages entered through the manual sliders, keyed by UI vocabulary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualEmotionVector(BTreeMap<String, u8>);

impl ManualEmotionVector {
    /// Slider keys of the manual entry form
    pub const MANUAL_KEYS: [&'static str; 6] =
        ["happy", "sad", "anger", "fear", "surprise", "neutral"];

    /// Slider keys of the music entry form
    pub const MUSIC_KEYS: [&'static str; 4] = ["happy", "sad", "anger", "fear"];

    /// Create a zeroed vector with the given keys
    pub fn with_keys(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| (k.to_string(), 0)).collect())
    }

    /// Set a value, clamped to 0-100. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, value: u8) -> bool {
        match self.0.get_mut(key) {
            Some(slot) => {
                *slot = value.min(100);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<u8> {
        self.0.get(key).copied()
    }

    /// True iff at least one emotion is above zero
    pub fn is_valid(&self) -> bool {
        self.0.values().any(|v| *v > 0)
    }

    /// Zero every value, keeping the keys
    pub fn reset(&mut self) {
        self.0.values_mut().for_each(|v| *v = 0);
    }

    /// Arg-max entry; an all-zero vector is `("neutral", 0)`
    pub fn dominant(&self) -> (String, u8) {
        self.0
            .iter()
            .fold(("neutral".to_string(), 0), |max, (key, value)| {
                if *value > max.1 {
                    (key.clone(), *value)
                } else {
                    max
                }
            })
    }

    /// Rewrite canonical or detector names into the UI vocabulary
    ///
    /// `angry` becomes `anger`, `fearful` becomes `fear` and so on. Unknown
    /// keys are dropped.
    pub fn to_ui_keys(&self) -> Self {
        let mut mapped = BTreeMap::new();
        for (key, value) in &self.0 {
            if let Some(emotion) = Emotion::parse(key) {
                let slot = mapped.entry(emotion.ui_key().to_string()).or_insert(0);
                *slot = (*slot).max(*value);
            }
        }
        Self(mapped)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u8)> for ManualEmotionVector {
    fn from_iter<T: IntoIterator<Item = (String, u8)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, v.min(100))).collect())
    }
}
