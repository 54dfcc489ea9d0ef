//! Session composition
//!
//! Joins tracker output, emotion input and context metadata into one
//! immutable [`Session`]. No network or storage happens here.

use std::sync::Arc;

use common::emotion::{EmotionSample, ManualEmotionVector};
use common::sanitize::normalize_phrase;
use common::session::{Context, DeviceInfo, Emotions, Session, TypingMode};
use common::{MIN_TEXT_CHARS, NO_MUSIC};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ComposeError;
use crate::tracker::TrackerOutput;

/// Emotion data handed to the composer
#[derive(Debug, Clone, PartialEq)]
pub enum EmotionInput {
    /// Slider percentages
    Manual(ManualEmotionVector),
    /// Detection timeline, with an optional forced sample used when it is empty
    Automatic {
        timeline: Vec<EmotionSample>,
        forced: Option<EmotionSample>,
    },
}

/// Session fields that come from outside the tracker and the emotion source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub user_id: String,
    pub device_info: DeviceInfo,
    /// Track playing in the music contexts
    pub music_id: Option<String>,
    /// Phrase shown in the fixed contexts
    pub fixed_text: Option<String>,
}

pub struct SessionComposer {
    clock: Arc<dyn Clock>,
}

impl SessionComposer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build a session or explain why the input is not savable
    pub fn compose(
        &self,
        tracker: TrackerOutput,
        emotions: EmotionInput,
        context: Context,
        metadata: SessionMetadata,
    ) -> Result<Session, ComposeError> {
        let actual = tracker.text.chars().count();
        if actual < MIN_TEXT_CHARS {
            return Err(ComposeError::TooShortInput {
                min: MIN_TEXT_CHARS,
                actual,
            });
        }

        let typing_mode = if context.is_fixed() {
            let phrase = metadata
                .fixed_text
                .as_deref()
                .ok_or(ComposeError::PhraseMismatch)?;
            if normalize_phrase(&tracker.text) != normalize_phrase(phrase) {
                return Err(ComposeError::PhraseMismatch);
            }
            Some(TypingMode::Fixed)
        } else if context.requires_manual_emotions() {
            Some(TypingMode::Free)
        } else {
            None
        };

        let emotions = match (context.requires_manual_emotions(), emotions) {
            (true, EmotionInput::Manual(vector)) => {
                if !vector.is_valid() {
                    return Err(ComposeError::NoEmotionSelected);
                }
                Emotions::Manual(vector.to_ui_keys())
            }
            (false, EmotionInput::Automatic { mut timeline, forced }) => {
                if timeline.is_empty() {
                    timeline.push(forced.ok_or(ComposeError::NoEmotionDetected)?);
                }
                Emotions::Timeline(timeline)
            }
            _ => return Err(ComposeError::EmotionSourceMismatch(context.to_string())),
        };

        let music_id = if context.is_music() {
            metadata
                .music_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| NO_MUSIC.to_string())
        } else {
            NO_MUSIC.to_string()
        };

        let session = Session {
            user_id: metadata.user_id,
            session_id: Uuid::new_v4().to_string(),
            context,
            text: tracker.text,
            timings: tracker.keystroke_data.iter().map(|e| e.time_ms).collect(),
            keystroke_data: tracker.keystroke_data,
            emotion_timeline: emotions.timeline(),
            detection_type: emotions.detection_type(),
            emotions,
            session_duration: tracker.session_duration_ms,
            keystroke_count: tracker.keystroke_count,
            typing_speed: tracker.typing_speed,
            camera_active: context == Context::Webcam,
            music_id,
            device_info: metadata.device_info,
            timestamp: self.clock.now_utc(),
            typing_mode,
            fixed_text: if context.is_fixed() {
                metadata.fixed_text
            } else {
                None
            },
        };

        debug!(
            "Composed session {} ({}, {} events)",
            session.session_id,
            session.context,
            session.keystroke_data.len()
        );
        Ok(session)
    }
}
