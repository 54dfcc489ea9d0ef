//! Slider-driven emotion source

use async_trait::async_trait;
use common::emotion::ManualEmotionVector;
use common::session::{DetectionType, Emotions};

use super::EmotionSource;
use crate::error::EmotionError;

/// Percentages per emotion, set through discrete UI controls
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEmotionSource {
    values: ManualEmotionVector,
}

impl ManualEmotionSource {
    /// Sliders of the manual entry form
    pub fn manual() -> Self {
        Self {
            values: ManualEmotionVector::with_keys(&ManualEmotionVector::MANUAL_KEYS),
        }
    }

    /// Sliders of the music entry form
    pub fn music() -> Self {
        Self {
            values: ManualEmotionVector::with_keys(&ManualEmotionVector::MUSIC_KEYS),
        }
    }

    /// Set one slider, clamped to 0-100
    pub fn set(&mut self, key: &str, percent: u8) -> Result<(), EmotionError> {
        if self.values.set(key, percent) {
            Ok(())
        } else {
            Err(EmotionError::UnknownEmotion(key.to_string()))
        }
    }

    /// True iff at least one slider is above zero
    pub fn validate(&self) -> bool {
        self.values.is_valid()
    }

    pub fn values(&self) -> &ManualEmotionVector {
        &self.values
    }

    pub fn clear(&mut self) {
        self.values.reset();
    }
}

#[async_trait]
impl EmotionSource for ManualEmotionSource {
    async fn snapshot(&self) -> Emotions {
        Emotions::Manual(self.values.clone())
    }

    fn detection_type(&self) -> DetectionType {
        DetectionType::Manual
    }

    async fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_one_positive_value() {
        let mut source = ManualEmotionSource::manual();
        assert!(!source.validate());

        source.set("happy", 1).unwrap();
        assert!(source.validate());
    }

    #[test]
    fn test_music_form_rejects_surprise() {
        let mut source = ManualEmotionSource::music();
        assert_eq!(
            source.set("surprise", 20),
            Err(EmotionError::UnknownEmotion("surprise".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reset_zeroes_values() {
        let mut source = ManualEmotionSource::manual();
        source.reset().await;
        assert_eq!(source, ManualEmotionSource::manual());

        source.set("sad", 70).unwrap();
        source.set("fear", 30).unwrap();
        source.reset().await;

        assert!(!source.validate());
        assert_eq!(source, ManualEmotionSource::manual());
        assert!(matches!(source.snapshot().await, Emotions::Manual(v) if v.len() == 6));
    }
}
