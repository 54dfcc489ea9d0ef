//! Time sources for the capture pipeline

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Source of event timestamps (milliseconds) and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds, comparable between calls on the same clock
    fn now_ms(&self) -> f64;

    /// Wall-clock time used for record timestamps
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Clock backed by `Instant` and the system time
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock advanced explicitly, used for replaying recorded input
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    elapsed_ms: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            elapsed_ms: Mutex::new(0.0),
        }
    }

    /// Move the clock to an absolute offset; earlier offsets are ignored
    pub fn set_ms(&self, at_ms: f64) {
        let mut elapsed = self.elapsed_ms.lock().unwrap_or_else(|e| e.into_inner());
        if at_ms > *elapsed {
            *elapsed = at_ms;
        }
    }

    pub fn advance_ms(&self, delta_ms: f64) {
        let mut elapsed = self.elapsed_ms.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += delta_ms.max(0.0);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.elapsed_ms.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.start + Duration::microseconds((self.now_ms() * 1000.0) as i64)
    }
}
