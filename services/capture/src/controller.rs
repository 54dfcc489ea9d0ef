//! Capture controller
//!
//! Owns one tracker, the emotion sources and the save pipeline for the
//! active context. Every dependency is injected; nothing is global.

use std::sync::Arc;

use common::emotion::{Emotion, EmotionSample};
use common::session::{Context, DeviceInfo};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::composer::{EmotionInput, SessionComposer, SessionMetadata};
use crate::config::CaptureConfig;
use crate::emotion::{AutomaticEmotionSource, DetectionState, EmotionSource, ManualEmotionSource};
use crate::error::{DetectionError, SaveError};
use crate::identity::DeviceIdentity;
use crate::persistence::{PersistenceClient, SaveResult};
use crate::tracker::{KeystrokeTracker, TypingMetrics, start_speed_updates};

/// Score given to an emotion picked by hand after detection found nothing
pub const FORCED_SCORE: u8 = 100;

pub struct CaptureController {
    context: Context,
    clock: Arc<dyn Clock>,
    config: Arc<CaptureConfig>,
    tracker: Arc<Mutex<KeystrokeTracker>>,
    manual: ManualEmotionSource,
    automatic: Option<AutomaticEmotionSource>,
    composer: SessionComposer,
    persistence: PersistenceClient,
    identity: DeviceIdentity,
    music_id: Option<String>,
    fixed_text: Option<String>,
    device_info: DeviceInfo,
}

impl CaptureController {
    pub fn new(
        context: Context,
        clock: Arc<dyn Clock>,
        config: Arc<CaptureConfig>,
        persistence: PersistenceClient,
        identity: DeviceIdentity,
        automatic: Option<AutomaticEmotionSource>,
    ) -> Self {
        Self {
            context,
            composer: SessionComposer::new(clock.clone()),
            clock,
            config,
            tracker: Arc::new(Mutex::new(KeystrokeTracker::new(field_for(context)))),
            manual: manual_source_for(context),
            automatic,
            persistence,
            identity,
            music_id: None,
            fixed_text: None,
            device_info: DeviceInfo::current(),
        }
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn tracker(&self) -> Arc<Mutex<KeystrokeTracker>> {
        Arc::clone(&self.tracker)
    }

    pub fn manual_mut(&mut self) -> &mut ManualEmotionSource {
        &mut self.manual
    }

    pub fn automatic(&self) -> Option<&AutomaticEmotionSource> {
        self.automatic.as_ref()
    }

    pub fn set_music(&mut self, music_id: impl Into<String>) {
        self.music_id = Some(music_id.into());
    }

    pub fn set_fixed_text(&mut self, phrase: impl Into<String>) {
        self.fixed_text = Some(phrase.into());
    }

    pub fn set_device_info(&mut self, device_info: DeviceInfo) {
        self.device_info = device_info;
    }

    /// Start the live typing-speed feed for the current tracker
    pub async fn typing_metrics(&self) -> watch::Receiver<TypingMetrics> {
        start_speed_updates(
            &self.tracker,
            self.clock.clone(),
            self.config.speed_update_period,
        )
        .await
    }

    /// Load the models and open the camera for the webcam context
    ///
    /// Returns whether detection is running; any failure leaves the
    /// controller usable with a manually picked emotion.
    pub async fn start_webcam(&mut self) -> bool {
        let Some(source) = self.automatic.as_mut() else {
            warn!("No face detector configured, manual emotion entry required");
            return false;
        };

        if source.load_models().await != DetectionState::Ready {
            return false;
        }

        match source.start().await {
            Ok(()) => true,
            Err(DetectionError::Capture(e)) => {
                warn!("Webcam unavailable: {}", e);
                false
            }
            Err(e) => {
                warn!("Emotion detection not started: {}", e);
                false
            }
        }
    }

    /// Whether the user has to pick an emotion by hand before saving
    pub async fn manual_override_required(&self) -> bool {
        match &self.automatic {
            Some(source) => source.manual_override_required().await,
            None => true,
        }
    }

    /// Leave the current context, releasing the camera and clearing input
    pub async fn switch_mode(&mut self, context: Context) {
        if let Some(source) = self.automatic.as_mut() {
            source.reset().await;
        }
        self.tracker.lock().await.reset();

        self.context = context;
        self.tracker = Arc::new(Mutex::new(KeystrokeTracker::new(field_for(context))));
        self.manual = manual_source_for(context);
        self.music_id = None;
        self.fixed_text = None;

        info!("Switched to {} mode", context);
    }

    /// Compose the current input into a session and persist it
    ///
    /// `forced` is only used in the webcam context when detection produced
    /// no sample. On success the tracker and the emotion sources are reset;
    /// on a compose error everything is kept so the user can fix the input.
    pub async fn save(&mut self, forced: Option<Emotion>) -> Result<SaveResult, SaveError> {
        let user_id = self.identity.user_id().await?;
        let output = self.tracker.lock().await.output();
        let emotions = self.emotion_input(forced).await;
        let forced_sample = match &emotions {
            EmotionInput::Automatic { forced, .. } => forced.clone(),
            EmotionInput::Manual(_) => None,
        };

        let metadata = SessionMetadata {
            user_id,
            device_info: self.device_info.clone(),
            music_id: self.music_id.clone(),
            fixed_text: self.fixed_text.clone(),
        };

        let session = self
            .composer
            .compose(output, emotions, self.context, metadata)?;
        let result = self.persistence.save(&session).await?;

        self.tracker.lock().await.reset();
        self.manual.reset().await;
        if let Some(source) = self.automatic.as_mut() {
            if let Some(sample) = forced_sample {
                source.record(sample).await;
            }
            source.reset().await;
        }

        Ok(result)
    }

    async fn emotion_input(&self, forced: Option<Emotion>) -> EmotionInput {
        if self.context.requires_manual_emotions() {
            return EmotionInput::Manual(self.manual.values().clone());
        }

        let timeline = match &self.automatic {
            Some(source) => source.snapshot().await.timeline(),
            None => Vec::new(),
        };

        let forced = match (timeline.is_empty(), forced) {
            (true, Some(emotion)) => Some(match &self.automatic {
                Some(source) => source.forced_sample(emotion, FORCED_SCORE).await,
                None => EmotionSample::forced(0.0, emotion, FORCED_SCORE),
            }),
            _ => None,
        };

        EmotionInput::Automatic { timeline, forced }
    }
}

fn field_for(context: Context) -> String {
    format!("{}-typing-area", context)
}

fn manual_source_for(context: Context) -> ManualEmotionSource {
    if context.is_music() {
        ManualEmotionSource::music()
    } else {
        ManualEmotionSource::manual()
    }
}
