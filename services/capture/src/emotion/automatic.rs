//! Facial-expression emotion source
//!
//! Lifecycle: `Uninitialized -> ModelLoading -> (Ready | ModelFailed) ->
//! Detecting -> Stopped`. While detecting, a polling task samples the video
//! feed, runs face detection and expression classification through the
//! [`FaceDetector`] capability and appends confident, de-flickered samples
//! to the timeline. Every failure (model load, camera permission, no face
//! after the bound, repeated detector errors) raises the manual override
//! flag instead of failing the session.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::emotion::{Emotion, EmotionSample, confidence_to_percent};
use common::session::{DetectionType, Emotions};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::EmotionSource;
use crate::clock::Clock;
use crate::error::{CaptureError, DetectionError};

/// One video frame handed to the detector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Face detection and expression classification capability
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Load the detector and the expression classifier from `location`
    async fn load_models(&self, location: &str) -> Result<(), DetectionError>;

    /// Confidence of the best face in the frame, if any
    async fn detect_face(&self, frame: &Frame) -> Result<Option<f32>, DetectionError>;

    /// Confidence per expression label (detector vocabulary)
    async fn classify_expressions(
        &self,
        frame: &Frame,
    ) -> Result<Option<HashMap<String, f32>>, DetectionError>;
}

/// Camera capability
#[async_trait]
pub trait VideoCapture: Send + Sync {
    /// Acquire the device; fails with `PermissionDenied` when refused
    async fn open(&self) -> Result<(), CaptureError>;

    /// Current frame, or `None` while the feed is not ready
    async fn frame(&self) -> Option<Frame>;

    /// Release the device
    fn release(&self);
}

/// Tuning of the detection loop
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Where the detector models are loaded from
    pub model_location: String,
    pub model_load_timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive frames without a face before the manual override
    pub max_empty_attempts: u32,
    /// Consecutive detector errors before the manual override
    pub max_failures: u32,
    /// Minimum arg-max confidence (0.0..=1.0) for a sample to be emitted
    pub min_confidence: f32,
    /// Majority-vote window used to suppress flicker
    pub smoothing_window: usize,
    /// Score change (percent points) that justifies a new sample of the same emotion
    pub min_score_change: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_location: "/models/face-api-models".to_string(),
            model_load_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(300),
            max_empty_attempts: 5,
            max_failures: 5,
            min_confidence: 0.2,
            smoothing_window: 3,
            min_score_change: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Uninitialized,
    ModelLoading,
    Ready,
    ModelFailed,
    Detecting,
    Stopped,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionState::Uninitialized => "uninitialized",
            DetectionState::ModelLoading => "model-loading",
            DetectionState::Ready => "ready",
            DetectionState::ModelFailed => "model-failed",
            DetectionState::Detecting => "detecting",
            DetectionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot published to observers after every change
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionStatus {
    pub state: DetectionState,
    pub timeline_len: usize,
    pub empty_attempts: u32,
    pub manual_override_required: bool,
    pub last_sample: Option<EmotionSample>,
}

/// Result of one polling step
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not detecting; the loop should end
    Stopped,
    /// The video feed has no frame yet
    NotReady,
    NoFace { attempts: u32 },
    /// A face but no usable expressions
    NoExpressions,
    LowConfidence { emotion: Emotion, confidence: f32 },
    /// Smoothing or de-duplication held the sample back
    Suppressed,
    Sampled(EmotionSample),
    /// A detector error below the failure bound
    Failed,
    /// The bound was reached; the caller must offer manual entry
    ManualOverride,
}

#[derive(Debug)]
struct Shared {
    state: DetectionState,
    models_loaded: bool,
    session_start_ms: Option<f64>,
    timeline: Vec<EmotionSample>,
    smoothing: VecDeque<Emotion>,
    last_appended: Option<(Emotion, u8)>,
    empty_attempts: u32,
    failures: u32,
    manual_override: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: DetectionState::Uninitialized,
            models_loaded: false,
            session_start_ms: None,
            timeline: Vec::new(),
            smoothing: VecDeque::new(),
            last_appended: None,
            empty_attempts: 0,
            failures: 0,
            manual_override: false,
        }
    }

    fn status(&self) -> DetectionStatus {
        DetectionStatus {
            state: self.state,
            timeline_len: self.timeline.len(),
            empty_attempts: self.empty_attempts,
            manual_override_required: self.manual_override,
            last_sample: self.timeline.last().cloned(),
        }
    }
}

struct Engine {
    detector: Arc<dyn FaceDetector>,
    capture: Arc<dyn VideoCapture>,
    clock: Arc<dyn Clock>,
    config: DetectionConfig,
    /// Kept outside `shared` so `Drop` can release without the lock
    capture_open: AtomicBool,
    shared: Mutex<Shared>,
    status_tx: watch::Sender<DetectionStatus>,
}

impl Engine {
    fn publish(&self, shared: &Shared) {
        self.status_tx.send_replace(shared.status());
    }

    async fn tick(&self) -> TickOutcome {
        if self.shared.lock().await.state != DetectionState::Detecting {
            return TickOutcome::Stopped;
        }

        let Some(frame) = self.capture.frame().await else {
            return TickOutcome::NotReady;
        };

        let face = self.detector.detect_face(&frame).await;
        let face = match face {
            Ok(face) => face,
            Err(e) => return self.record_failure(e).await,
        };

        if face.is_none() {
            let mut shared = self.shared.lock().await;
            shared.empty_attempts += 1;
            let attempts = shared.empty_attempts;
            debug!(
                "No face detected (attempt {}/{})",
                attempts, self.config.max_empty_attempts
            );
            let outcome = if attempts >= self.config.max_empty_attempts {
                warn!("No face detected after {} attempts, manual entry required", attempts);
                shared.manual_override = true;
                TickOutcome::ManualOverride
            } else {
                TickOutcome::NoFace { attempts }
            };
            self.publish(&shared);
            return outcome;
        }

        self.shared.lock().await.empty_attempts = 0;

        let expressions = match self.detector.classify_expressions(&frame).await {
            Ok(Some(expressions)) => expressions,
            Ok(None) => return TickOutcome::NoExpressions,
            Err(e) => return self.record_failure(e).await,
        };

        let Some((emotion, confidence, all_emotions)) = canonical_scores(&expressions) else {
            return TickOutcome::NoExpressions;
        };

        let mut shared = self.shared.lock().await;
        shared.failures = 0;

        if confidence <= self.config.min_confidence {
            return TickOutcome::LowConfidence {
                emotion,
                confidence,
            };
        }

        let window = self.config.smoothing_window.max(1);
        shared.smoothing.push_back(emotion);
        while shared.smoothing.len() > window {
            shared.smoothing.pop_front();
        }
        if shared.smoothing.len() == window && majority(&shared.smoothing) != Some(emotion) {
            return TickOutcome::Suppressed;
        }

        let score = confidence_to_percent(confidence);
        if let Some((last_emotion, last_score)) = shared.last_appended {
            if last_emotion == emotion && last_score.abs_diff(score) <= self.config.min_score_change
            {
                return TickOutcome::Suppressed;
            }
        }

        let start = shared.session_start_ms.unwrap_or_default();
        let sample = EmotionSample {
            timestamp: (self.clock.now_ms() - start).max(0.0),
            emotion,
            score,
            all_emotions,
        };
        shared.timeline.push(sample.clone());
        shared.last_appended = Some((emotion, score));
        self.publish(&shared);

        debug!("Emotion detected: {} ({}%)", emotion, score);
        TickOutcome::Sampled(sample)
    }

    async fn record_failure(&self, e: DetectionError) -> TickOutcome {
        let mut shared = self.shared.lock().await;
        shared.failures += 1;
        error!(
            "Detection error ({}/{}): {}",
            shared.failures, self.config.max_failures, e
        );

        if shared.failures >= self.config.max_failures {
            shared.manual_override = true;
            self.publish(&shared);
            return TickOutcome::ManualOverride;
        }
        TickOutcome::Failed
    }
}

/// Map detector labels to the canonical vocabulary and pick the arg-max
///
/// Unknown labels are dropped. Returns the winning emotion, its raw
/// confidence and the full percentage map.
fn canonical_scores(
    expressions: &HashMap<String, f32>,
) -> Option<(Emotion, f32, BTreeMap<Emotion, u8>)> {
    let mut confidences: BTreeMap<Emotion, f32> = BTreeMap::new();
    for (label, confidence) in expressions {
        match Emotion::parse(label) {
            Some(emotion) => {
                let slot = confidences.entry(emotion).or_insert(0.0);
                *slot = slot.max(*confidence);
            }
            None => debug!("Dropping unknown expression label {:?}", label),
        }
    }

    let (emotion, confidence) = confidences
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(e, c)| (*e, *c))?;

    let percents = confidences
        .into_iter()
        .map(|(e, c)| (e, confidence_to_percent(c)))
        .collect();

    Some((emotion, confidence, percents))
}

fn majority(window: &VecDeque<Emotion>) -> Option<Emotion> {
    let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
    for emotion in window {
        *counts.entry(*emotion).or_default() += 1;
    }
    let best = counts.values().copied().max()?;
    // Ties go to the most recent emotion among the leaders
    window
        .iter()
        .rev()
        .find(|e| counts.get(e) == Some(&best))
        .copied()
}

/// Emotion source fed by periodic facial-expression sampling
pub struct AutomaticEmotionSource {
    engine: Arc<Engine>,
    task: Option<JoinHandle<()>>,
}

impl AutomaticEmotionSource {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        capture: Arc<dyn VideoCapture>,
        clock: Arc<dyn Clock>,
        config: DetectionConfig,
    ) -> Self {
        let shared = Shared::new();
        let (status_tx, _) = watch::channel(shared.status());

        Self {
            engine: Arc::new(Engine {
                detector,
                capture,
                clock,
                config,
                capture_open: AtomicBool::new(false),
                shared: Mutex::new(shared),
                status_tx,
            }),
            task: None,
        }
    }

    /// Load the detector models, bounded by the configured timeout
    pub async fn load_models(&self) -> DetectionState {
        {
            let mut shared = self.engine.shared.lock().await;
            if shared.models_loaded {
                return shared.state;
            }
            shared.state = DetectionState::ModelLoading;
            self.engine.publish(&shared);
        }

        let config = &self.engine.config;
        info!("Loading face detection models from {}", config.model_location);
        let loaded = tokio::time::timeout(
            config.model_load_timeout,
            self.engine.detector.load_models(&config.model_location),
        )
        .await;

        let result = match loaded {
            Ok(result) => result,
            Err(_) => Err(DetectionError::ModelLoadTimeout(
                config.model_load_timeout.as_millis(),
            )),
        };

        let mut shared = self.engine.shared.lock().await;
        match result {
            Ok(()) => {
                info!("Face detection models loaded");
                shared.models_loaded = true;
                shared.state = DetectionState::Ready;
            }
            Err(e) => {
                error!("Face detection disabled: {}", e);
                shared.state = DetectionState::ModelFailed;
                shared.manual_override = true;
            }
        }
        self.engine.publish(&shared);
        shared.state
    }

    /// Open the camera and start the polling loop
    ///
    /// Permission denial is returned as an error and also raises the manual
    /// override flag.
    pub async fn start(&mut self) -> Result<(), DetectionError> {
        {
            let shared = self.engine.shared.lock().await;
            match shared.state {
                DetectionState::Ready | DetectionState::Stopped if shared.models_loaded => {}
                DetectionState::ModelFailed => return Err(DetectionError::ModelUnavailable),
                state => {
                    return Err(DetectionError::InvalidState {
                        action: "start",
                        state: state.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.engine.capture.open().await {
            warn!("Camera unavailable, manual entry required: {}", e);
            let mut shared = self.engine.shared.lock().await;
            shared.manual_override = true;
            self.engine.publish(&shared);
            return Err(e.into());
        }

        {
            let mut shared = self.engine.shared.lock().await;
            self.engine.capture_open.store(true, Ordering::SeqCst);
            shared.session_start_ms = Some(self.engine.clock.now_ms());
            shared.state = DetectionState::Detecting;
            self.engine.publish(&shared);
        }

        let engine = Arc::clone(&self.engine);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.poll_interval);
            loop {
                ticker.tick().await;
                match engine.tick().await {
                    TickOutcome::Stopped | TickOutcome::ManualOverride => break,
                    _ => {}
                }
            }
            debug!("Emotion polling loop finished");
        }));

        info!("Emotion detection started");
        Ok(())
    }

    /// Run a single polling step outside the loop
    pub async fn tick(&self) -> TickOutcome {
        self.engine.tick().await
    }

    /// Append a sample concentrated on `emotion`
    ///
    /// Used when detection produced nothing by save time.
    pub async fn force_emotion(&self, emotion: Emotion, score: u8) -> EmotionSample {
        let sample = self.forced_sample(emotion, score).await;
        self.record(sample.clone()).await;
        sample
    }

    /// Build a forced sample stamped at the current offset without recording it
    pub async fn forced_sample(&self, emotion: Emotion, score: u8) -> EmotionSample {
        let now = self.engine.clock.now_ms();
        let start = self.engine.shared.lock().await.session_start_ms.unwrap_or(now);
        EmotionSample::forced((now - start).max(0.0), emotion, score)
    }

    /// Append a forced sample to the timeline
    pub async fn record(&self, sample: EmotionSample) {
        let mut shared = self.engine.shared.lock().await;
        info!("Forced emotion {} ({}%)", sample.emotion, sample.score);
        shared.last_appended = Some((sample.emotion, sample.score));
        shared.timeline.push(sample);
        self.engine.publish(&shared);
    }

    /// Cancel the polling loop and release the camera; safe to call repeatedly
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut shared = self.engine.shared.lock().await;
        if self.engine.capture_open.swap(false, Ordering::SeqCst) {
            self.engine.capture.release();
            info!("Camera released");
        }
        if shared.state == DetectionState::Detecting {
            shared.state = DetectionState::Stopped;
        }
        self.engine.publish(&shared);
    }

    pub async fn timeline(&self) -> Vec<EmotionSample> {
        self.engine.shared.lock().await.timeline.clone()
    }

    pub async fn state(&self) -> DetectionState {
        self.engine.shared.lock().await.state
    }

    pub async fn manual_override_required(&self) -> bool {
        self.engine.shared.lock().await.manual_override
    }

    pub fn status(&self) -> watch::Receiver<DetectionStatus> {
        self.engine.status_tx.subscribe()
    }
}

#[async_trait]
impl EmotionSource for AutomaticEmotionSource {
    async fn snapshot(&self) -> Emotions {
        Emotions::Timeline(self.timeline().await)
    }

    fn detection_type(&self) -> DetectionType {
        DetectionType::Automatic
    }

    /// Stop, then clear the timeline and counters; loaded models are kept
    async fn reset(&mut self) {
        self.stop().await;

        let mut shared = self.engine.shared.lock().await;
        shared.timeline.clear();
        shared.smoothing.clear();
        shared.last_appended = None;
        shared.empty_attempts = 0;
        shared.failures = 0;
        shared.session_start_ms = None;
        if shared.state != DetectionState::ModelFailed {
            shared.manual_override = false;
            shared.state = if shared.models_loaded {
                DetectionState::Ready
            } else {
                DetectionState::Uninitialized
            };
        }
        self.engine.publish(&shared);
    }
}

impl Drop for AutomaticEmotionSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.engine.capture_open.swap(false, Ordering::SeqCst) {
            self.engine.capture.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedDetector {
        fail_load: bool,
        hang_load: bool,
        faces: StdMutex<VecDeque<Option<f32>>>,
        expressions: StdMutex<VecDeque<HashMap<String, f32>>>,
    }

    impl ScriptedDetector {
        fn with_frames(frames: Vec<Option<Vec<(&str, f32)>>>) -> Self {
            let detector = Self::default();
            for frame in frames {
                match frame {
                    Some(scores) => {
                        detector.faces.lock().unwrap().push_back(Some(0.9));
                        detector.expressions.lock().unwrap().push_back(
                            scores.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                        );
                    }
                    None => detector.faces.lock().unwrap().push_back(None),
                }
            }
            detector
        }
    }

    #[async_trait]
    impl FaceDetector for ScriptedDetector {
        async fn load_models(&self, _location: &str) -> Result<(), DetectionError> {
            if self.hang_load {
                std::future::pending::<()>().await;
            }
            if self.fail_load {
                return Err(DetectionError::ModelLoad("manifest not accessible".into()));
            }
            Ok(())
        }

        async fn detect_face(&self, _frame: &Frame) -> Result<Option<f32>, DetectionError> {
            Ok(self.faces.lock().unwrap().pop_front().flatten())
        }

        async fn classify_expressions(
            &self,
            _frame: &Frame,
        ) -> Result<Option<HashMap<String, f32>>, DetectionError> {
            Ok(self.expressions.lock().unwrap().pop_front())
        }
    }

    #[derive(Default)]
    struct FakeCamera {
        deny: bool,
        releases: AtomicUsize,
        open: AtomicBool,
    }

    #[async_trait]
    impl VideoCapture for FakeCamera {
        async fn open(&self) -> Result<(), CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied);
            }
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn frame(&self) -> Option<Frame> {
            self.open.load(Ordering::SeqCst).then(Frame::default)
        }

        fn release(&self) {
            self.open.store(false, Ordering::SeqCst);
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(
        detector: ScriptedDetector,
        camera: Arc<FakeCamera>,
        config: DetectionConfig,
    ) -> AutomaticEmotionSource {
        AutomaticEmotionSource::new(
            Arc::new(detector),
            camera,
            Arc::new(ManualClock::new(Utc::now())),
            config,
        )
    }

    fn manual_ticks() -> DetectionConfig {
        DetectionConfig {
            // Keep the background loop out of the way; tests drive `tick`
            poll_interval: Duration::from_secs(3600),
            ..DetectionConfig::default()
        }
    }

    async fn started(detector: ScriptedDetector, camera: Arc<FakeCamera>) -> AutomaticEmotionSource {
        let mut source = source(detector, camera, manual_ticks());
        assert_eq!(source.load_models().await, DetectionState::Ready);
        source.start().await.unwrap();
        source
    }

    #[tokio::test]
    async fn test_model_failure_requires_manual_override() {
        let detector = ScriptedDetector {
            fail_load: true,
            ..Default::default()
        };
        let mut source = source(detector, Arc::new(FakeCamera::default()), manual_ticks());

        assert_eq!(source.load_models().await, DetectionState::ModelFailed);
        assert!(source.manual_override_required().await);
        assert_eq!(source.start().await, Err(DetectionError::ModelUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_load_times_out() {
        let detector = ScriptedDetector {
            hang_load: true,
            ..Default::default()
        };
        let source = source(detector, Arc::new(FakeCamera::default()), manual_ticks());

        assert_eq!(source.load_models().await, DetectionState::ModelFailed);
        assert!(source.manual_override_required().await);
    }

    #[tokio::test]
    async fn test_camera_denial_routes_to_manual_override() {
        let camera = Arc::new(FakeCamera {
            deny: true,
            ..Default::default()
        });
        let mut source = source(ScriptedDetector::default(), camera, manual_ticks());
        source.load_models().await;

        let result = source.start().await;
        assert_eq!(
            result,
            Err(DetectionError::Capture(CaptureError::PermissionDenied))
        );
        assert!(source.manual_override_required().await);
    }

    #[tokio::test]
    async fn test_empty_frames_trigger_override_after_bound() {
        let detector = ScriptedDetector::with_frames(vec![None; 5]);
        let source = source(detector, Arc::new(FakeCamera::default()), manual_ticks());
        source.load_models().await;
        // Drive detection without the background loop
        source.engine.shared.lock().await.state = DetectionState::Detecting;
        source.engine.capture.open().await.unwrap();

        for attempt in 1..5 {
            assert_eq!(source.tick().await, TickOutcome::NoFace { attempts: attempt });
        }
        assert_eq!(source.tick().await, TickOutcome::ManualOverride);
        assert!(source.manual_override_required().await);
        assert!(source.timeline().await.is_empty());
    }

    #[tokio::test]
    async fn test_confident_sample_keeps_score_equal_to_max() {
        let detector = ScriptedDetector::with_frames(vec![
            Some(vec![("happy", 0.7), ("sad", 0.2), ("contempt", 0.95)]),
            Some(vec![("happy", 0.1), ("neutral", 0.15)]),
        ]);
        let camera = Arc::new(FakeCamera::default());
        let source = source(detector, camera.clone(), manual_ticks());
        source.load_models().await;
        source.engine.shared.lock().await.state = DetectionState::Detecting;
        camera.open().await.unwrap();

        let TickOutcome::Sampled(sample) = source.tick().await else {
            panic!("expected a sample");
        };
        assert_eq!(sample.emotion, Emotion::Happy);
        assert_eq!(sample.score, 70);
        assert_eq!(sample.score, *sample.all_emotions.values().max().unwrap());
        assert_eq!(sample.all_emotions.len(), 2);

        assert!(matches!(
            source.tick().await,
            TickOutcome::LowConfidence { emotion: Emotion::Neutral, .. }
        ));
        assert_eq!(source.timeline().await.len(), 1);
    }

    #[tokio::test]
    async fn test_smoothing_suppresses_flicker_and_duplicates() {
        let detector = ScriptedDetector::with_frames(vec![
            Some(vec![("happy", 0.8)]),
            Some(vec![("happy", 0.82)]),
            Some(vec![("sad", 0.9)]),
            Some(vec![("sad", 0.9)]),
        ]);
        let camera = Arc::new(FakeCamera::default());
        let source = source(detector, camera.clone(), manual_ticks());
        source.load_models().await;
        source.engine.shared.lock().await.state = DetectionState::Detecting;
        camera.open().await.unwrap();

        assert!(matches!(source.tick().await, TickOutcome::Sampled(_)));
        // Same emotion, score moved by 2 points
        assert_eq!(source.tick().await, TickOutcome::Suppressed);
        // Window [happy, happy, sad]: majority still happy
        assert_eq!(source.tick().await, TickOutcome::Suppressed);
        // Window [happy, sad, sad]: sad wins
        let TickOutcome::Sampled(sample) = source.tick().await else {
            panic!("expected a sample");
        };
        assert_eq!(sample.emotion, Emotion::Sad);
        assert_eq!(source.timeline().await.len(), 2);
    }

    #[tokio::test]
    async fn test_force_emotion_and_idempotent_stop() {
        let camera = Arc::new(FakeCamera::default());
        let mut source = started(ScriptedDetector::default(), camera.clone()).await;

        let sample = source.force_emotion(Emotion::Sad, 100).await;
        assert_eq!(sample.all_emotions[&Emotion::Sad], 100);
        assert_eq!(source.timeline().await, vec![sample]);

        source.stop().await;
        source.stop().await;
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(source.state().await, DetectionState::Stopped);
        assert_eq!(source.tick().await, TickOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_forced_sample_is_not_recorded() {
        let camera = Arc::new(FakeCamera::default());
        let source = started(ScriptedDetector::default(), camera).await;

        let sample = source.forced_sample(Emotion::Happy, 100).await;
        assert_eq!(sample.emotion, Emotion::Happy);
        assert!(source.timeline().await.is_empty());

        source.record(sample.clone()).await;
        assert_eq!(source.timeline().await, vec![sample]);
    }

    #[tokio::test]
    async fn test_drop_releases_camera_while_state_is_locked() {
        let camera = Arc::new(FakeCamera::default());
        let source = started(ScriptedDetector::default(), camera.clone()).await;

        let engine = Arc::clone(&source.engine);
        let guard = engine.shared.lock().await;
        drop(source);
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        drop(guard);
    }

    #[tokio::test]
    async fn test_reset_returns_to_initial_state() {
        let mut never_started = source(
            ScriptedDetector::default(),
            Arc::new(FakeCamera::default()),
            manual_ticks(),
        );
        never_started.reset().await;
        assert_eq!(never_started.state().await, DetectionState::Uninitialized);

        let camera = Arc::new(FakeCamera::default());
        let mut source = started(ScriptedDetector::default(), camera).await;
        source.force_emotion(Emotion::Happy, 60).await;

        source.reset().await;
        source.reset().await;
        assert!(source.timeline().await.is_empty());
        assert!(!source.manual_override_required().await);
        assert_eq!(source.state().await, DetectionState::Ready);
        let published = source.status().borrow().clone();
        assert_eq!(published.timeline_len, 0);
        assert_eq!(published.state, DetectionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_loop_collects_samples() {
        let detector = ScriptedDetector::with_frames(vec![
            Some(vec![("surprised", 0.6)]),
            None,
        ]);
        let camera = Arc::new(FakeCamera::default());
        let mut source = source(detector, camera, DetectionConfig::default());
        source.load_models().await;
        source.start().await.unwrap();

        let mut status = source.status();
        status
            .wait_for(|s| s.timeline_len == 1)
            .await
            .unwrap();

        source.stop().await;
        let timeline = source.timeline().await;
        assert_eq!(timeline[0].emotion, Emotion::Surprised);
    }
}
