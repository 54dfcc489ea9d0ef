//! Keystroke interval tracking for one text field
//!
//! The tracker turns raw key-down/key-up signals into the four interval
//! classes (press-press, press-release, release-release, release-press) and
//! maintains the keystroke count and typing speed. It holds no reference to
//! any UI: an adapter forwards events with their timestamps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::keystroke::{IntervalKind, KeystrokeEvent};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::clock::Clock;

/// UI surface that owns the text fields a tracker can bind to
pub trait TextSurface {
    fn has_field(&self, field_id: &str) -> bool;
}

/// Live metrics shown while typing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingMetrics {
    pub keystroke_count: u32,
    /// Characters per minute
    pub typing_speed: f64,
}

/// Everything the composer needs from a tracker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerOutput {
    pub text: String,
    pub keystroke_data: Vec<KeystrokeEvent>,
    pub keystroke_count: u32,
    pub typing_speed: f64,
    pub session_duration_ms: f64,
}

/// Tracks key intervals on a single text field
#[derive(Debug)]
pub struct KeystrokeTracker {
    field_id: String,
    inert: bool,
    text: String,
    events: Vec<KeystrokeEvent>,
    pressed: HashMap<String, f64>,
    last_press: Option<(String, f64)>,
    last_release: Option<(String, f64)>,
    first_press_ms: Option<f64>,
    keystroke_count: u32,
    typing_speed: f64,
    speed_task: Option<AbortHandle>,
}

impl KeystrokeTracker {
    /// Create an active tracker for a field
    pub fn new(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            inert: false,
            text: String::new(),
            events: Vec::new(),
            pressed: HashMap::new(),
            last_press: None,
            last_release: None,
            first_press_ms: None,
            keystroke_count: 0,
            typing_speed: 0.0,
            speed_task: None,
        }
    }

    /// Bind to a field of a surface
    ///
    /// A missing field is reported and yields an inert tracker that ignores
    /// every event.
    pub fn attach(surface: &impl TextSurface, field_id: &str) -> Self {
        let mut tracker = Self::new(field_id);
        if !surface.has_field(field_id) {
            error!("Text field with ID \"{}\" not found", field_id);
            tracker.inert = true;
        }
        tracker
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// Handle a key-down at `at_ms`
    pub fn key_down(&mut self, key: &str, at_ms: f64) {
        if self.inert || self.pressed.contains_key(key) {
            return;
        }

        self.pressed.insert(key.to_string(), at_ms);
        self.first_press_ms.get_or_insert(at_ms);

        if let Some((prev_key, prev_ms)) = &self.last_press {
            self.events.push(KeystrokeEvent::between(
                IntervalKind::PressPress,
                prev_key,
                key,
                at_ms - prev_ms,
            ));
        }

        if let Some((prev_key, prev_ms)) = &self.last_release {
            self.events.push(KeystrokeEvent::between(
                IntervalKind::ReleasePress,
                prev_key,
                key,
                at_ms - prev_ms,
            ));
        }

        self.last_press = Some((key.to_string(), at_ms));
    }

    /// Handle a key-up at `at_ms`; keys never seen going down are ignored
    pub fn key_up(&mut self, key: &str, at_ms: f64) {
        if self.inert {
            return;
        }

        let Some(pressed_at) = self.pressed.remove(key) else {
            debug!("Ignoring release of untracked key {:?}", key);
            return;
        };

        self.events
            .push(KeystrokeEvent::hold(key, at_ms - pressed_at));

        if let Some((prev_key, prev_ms)) = &self.last_release {
            self.events.push(KeystrokeEvent::between(
                IntervalKind::ReleaseRelease,
                prev_key,
                key,
                at_ms - prev_ms,
            ));
        }

        self.keystroke_count += 1;
        self.typing_speed = self.speed_at(at_ms);
        self.last_release = Some((key.to_string(), at_ms));
    }

    /// Mirror the current value of the field
    pub fn set_text(&mut self, text: &str) {
        if !self.inert {
            self.text = text.to_string();
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        &self.events
    }

    /// Metrics as of `now_ms`, used by the periodic speed updates
    pub fn metrics_at(&self, now_ms: f64) -> TypingMetrics {
        TypingMetrics {
            keystroke_count: self.keystroke_count,
            typing_speed: self.speed_at(now_ms),
        }
    }

    pub fn output(&self) -> TrackerOutput {
        let session_duration_ms = match (self.first_press_ms, &self.last_release) {
            (Some(first), Some((_, last))) => (last - first).max(0.0),
            _ => 0.0,
        };

        TrackerOutput {
            text: self.text.clone(),
            keystroke_data: self.events.clone(),
            keystroke_count: self.keystroke_count,
            typing_speed: self.typing_speed,
            session_duration_ms,
        }
    }

    /// Return to the initial empty state and stop the speed updates
    pub fn reset(&mut self) {
        if let Some(task) = self.speed_task.take() {
            task.abort();
        }
        self.text.clear();
        self.events.clear();
        self.pressed.clear();
        self.last_press = None;
        self.last_release = None;
        self.first_press_ms = None;
        self.keystroke_count = 0;
        self.typing_speed = 0.0;
    }

    fn speed_at(&self, now_ms: f64) -> f64 {
        let Some(first) = self.first_press_ms else {
            return 0.0;
        };
        let elapsed_minutes = (now_ms - first) / 60_000.0;
        if elapsed_minutes <= 0.0 {
            return 0.0;
        }
        f64::from(self.keystroke_count) / elapsed_minutes
    }
}

impl Drop for KeystrokeTracker {
    fn drop(&mut self) {
        if let Some(task) = self.speed_task.take() {
            task.abort();
        }
    }
}

/// Publish typing metrics every `period` until the tracker is reset or dropped
///
/// Starting again replaces the previous update task.
pub async fn start_speed_updates(
    tracker: &Arc<Mutex<KeystrokeTracker>>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> watch::Receiver<TypingMetrics> {
    let (tx, rx) = watch::channel(TypingMetrics::default());

    let mut guard = tracker.lock().await;
    if guard.is_inert() {
        return rx;
    }

    let weak = Arc::downgrade(tracker);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(tracker) = weak.upgrade() else {
                break;
            };
            let metrics = tracker.lock().await.metrics_at(clock.now_ms());
            if tx.send(metrics).is_err() {
                break;
            }
        }
    });

    if let Some(previous) = guard.speed_task.replace(task.abort_handle()) {
        previous.abort();
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;

    struct Page(Vec<&'static str>);

    impl TextSurface for Page {
        fn has_field(&self, field_id: &str) -> bool {
            self.0.contains(&field_id)
        }
    }

    fn kinds(tracker: &KeystrokeTracker) -> Vec<IntervalKind> {
        tracker.events().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_two_key_sequence_emits_all_interval_classes() {
        let mut tracker = KeystrokeTracker::new("typing-area");
        tracker.key_down("h", 0.0);
        tracker.key_up("h", 80.0);
        tracker.key_down("i", 150.0);
        tracker.key_up("i", 210.0);

        assert_eq!(
            kinds(&tracker),
            vec![
                IntervalKind::PressRelease,
                IntervalKind::PressPress,
                IntervalKind::ReleasePress,
                IntervalKind::PressRelease,
                IntervalKind::ReleaseRelease,
            ]
        );

        let events = tracker.events();
        assert_eq!(events[0].time_ms, 80.0);
        assert_eq!(events[1].time_ms, 150.0);
        assert_eq!(events[2].time_ms, 70.0);
        assert_eq!(events[2].key1.as_deref(), Some("h"));
        assert_eq!(events[2].key2.as_deref(), Some("i"));
        assert_eq!(events[3].time_ms, 60.0);
        assert_eq!(events[4].time_ms, 130.0);
    }

    #[test]
    fn test_key_repeat_is_suppressed() {
        let mut tracker = KeystrokeTracker::new("typing-area");
        tracker.key_down("a", 0.0);
        tracker.key_down("a", 30.0);
        tracker.key_down("a", 60.0);
        tracker.key_up("a", 100.0);

        assert_eq!(kinds(&tracker), vec![IntervalKind::PressRelease]);
        assert_eq!(tracker.events()[0].time_ms, 100.0);
        assert_eq!(tracker.output().keystroke_count, 1);
    }

    #[test]
    fn test_press_release_matches_overlapping_keys() {
        let mut tracker = KeystrokeTracker::new("typing-area");
        tracker.key_down("Shift", 0.0);
        tracker.key_down("A", 40.0);
        tracker.key_up("A", 90.0);
        tracker.key_up("Shift", 120.0);
        tracker.key_up("Z", 130.0);

        let holds: Vec<(&str, f64)> = tracker
            .events()
            .iter()
            .filter(|e| e.kind == IntervalKind::PressRelease)
            .map(|e| (e.key.as_deref().unwrap_or_default(), e.time_ms))
            .collect();

        assert_eq!(holds, vec![("A", 50.0), ("Shift", 120.0)]);
        assert_eq!(tracker.output().keystroke_count, 2);
    }

    #[test]
    fn test_typing_speed_and_duration() {
        let mut tracker = KeystrokeTracker::new("typing-area");
        tracker.key_down("a", 0.0);
        tracker.key_up("a", 15_000.0);
        tracker.key_down("b", 20_000.0);
        tracker.key_up("b", 30_000.0);

        let output = tracker.output();
        // 2 characters over half a minute
        assert_eq!(output.typing_speed, 4.0);
        assert_eq!(output.session_duration_ms, 30_000.0);
        assert_eq!(tracker.metrics_at(60_000.0).typing_speed, 2.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut tracker = KeystrokeTracker::new("typing-area");
        tracker.reset();
        assert_eq!(tracker.output(), TrackerOutput::default());

        tracker.set_text("abc");
        tracker.key_down("a", 1.0);
        tracker.key_up("a", 2.0);
        tracker.reset();
        tracker.reset();

        assert_eq!(tracker.output(), TrackerOutput::default());
        tracker.key_down("b", 10.0);
        assert!(tracker.events().is_empty());
    }

    #[test]
    fn test_missing_field_gives_inert_tracker() {
        let page = Page(vec!["typing-area"]);
        let mut tracker = KeystrokeTracker::attach(&page, "webcam-typing-area");
        assert!(tracker.is_inert());

        tracker.set_text("ignored");
        tracker.key_down("a", 0.0);
        tracker.key_up("a", 10.0);
        assert_eq!(tracker.output(), TrackerOutput::default());

        let bound = KeystrokeTracker::attach(&page, "typing-area");
        assert!(!bound.is_inert());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_updates_stop_on_reset() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tracker = Arc::new(Mutex::new(KeystrokeTracker::new("typing-area")));
        {
            let mut t = tracker.lock().await;
            t.key_down("a", 0.0);
            t.key_up("a", 10.0);
        }
        clock.set_ms(30_000.0);

        let mut rx = start_speed_updates(&tracker, clock.clone(), Duration::from_millis(500)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().keystroke_count, 1);
        assert_eq!(rx.borrow().typing_speed, 2.0);

        tracker.lock().await.reset();
        // The task is aborted, so the sender is dropped
        assert!(rx.changed().await.is_err());
    }
}
