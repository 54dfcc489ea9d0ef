//! Emotion sources
//!
//! Two variants feed the composer: slider input ([`ManualEmotionSource`])
//! and periodic facial-expression sampling ([`AutomaticEmotionSource`]).

use async_trait::async_trait;
use common::session::{DetectionType, Emotions};

pub mod automatic;
pub mod manual;

pub use automatic::{
    AutomaticEmotionSource, DetectionConfig, DetectionState, DetectionStatus, FaceDetector, Frame,
    TickOutcome, VideoCapture,
};
pub use manual::ManualEmotionSource;

/// Capability shared by every emotion source
#[async_trait]
pub trait EmotionSource: Send + Sync {
    /// Current emotions in the shape the composer consumes
    async fn snapshot(&self) -> Emotions;

    fn detection_type(&self) -> DetectionType;

    /// Return to the initial empty state
    async fn reset(&mut self);
}
