//! Clocks supplying "now" to tracking sessions

use chrono::{DateTime, Utc};
use holdwatch_util::MonotonicInstant;

/// Source of the current wall-clock instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock on every call (honors `HOLDWATCH_MOCK_TIME`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        holdwatch_util::now()
    }
}

/// Wall clock read once, then advanced by monotonic time.
///
/// Countdowns driven by this clock are immune to wall-clock changes while
/// a session runs.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor_mono: MonotonicInstant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::anchored_at(holdwatch_util::now())
    }

    /// Anchor at an explicit wall-clock instant
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor_mono: MonotonicInstant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = MonotonicInstant::now().duration_since(self.anchor_mono);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.anchor_wall + elapsed,
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }
}
