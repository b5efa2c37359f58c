//! Time utilities and the clock abstraction.

use chrono::{DateTime, Duration, DurationRound, Utc};
use parking_lot::Mutex;

/// A timestamp with timezone (always UTC for fxdesk).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Drop the sub-second part of a timestamp.
pub fn truncate_to_second(ts: Timestamp) -> Timestamp {
    ts.duration_trunc(Duration::seconds(1)).unwrap_or(ts)
}

/// Check if an expiry instant has passed at `at`.
pub fn is_expired_at(expiry: Timestamp, at: Timestamp) -> bool {
    at >= expiry
}

/// Source of the current time.
///
/// TTL decisions read time through this trait so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.current.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}
