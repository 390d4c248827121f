//! Clock abstraction shared by every time-dependent component.
//!
//! Cache expiry and rate limit windows are wall-clock values (the reset
//! timestamp is exposed to clients in epoch seconds), so the clock deals in
//! `DateTime<Utc>` rather than monotonic instants.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current time.
///
/// Injected into the cache store, the rate limiters, the metrics aggregator,
/// and the pipeline so tests can cross TTL and window boundaries without
/// sleeping.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock.
///
/// This is primarily useful for testing.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given time.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
