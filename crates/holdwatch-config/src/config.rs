//! Validated configuration structures

use crate::schema::{RawConfig, RawReservationConfig, RawTrackerConfig};
use std::time::Duration;

pub const DEFAULT_FALLBACK_REDIRECT_PATH: &str = "/";
pub const DEFAULT_DEFERRED_TRANSITION_DELAY_MS: u64 = 3000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HOLD_MINUTES: u64 = 15;

/// Validated configuration ready for use by the tracker
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub reservations: ReservationConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            tracker: TrackerConfig::from_raw(raw.tracker),
            reservations: ReservationConfig::from_raw(raw.reservations),
        }
    }
}

/// Countdown tracker settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub fallback_redirect_path: String,
    pub deferred_transition_delay: Duration,
    pub tick_interval: Duration,
}

impl TrackerConfig {
    fn from_raw(raw: RawTrackerConfig) -> Self {
        Self {
            fallback_redirect_path: raw
                .fallback_redirect_path
                .unwrap_or_else(|| DEFAULT_FALLBACK_REDIRECT_PATH.to_string()),
            deferred_transition_delay: Duration::from_millis(
                raw.deferred_transition_delay_ms
                    .unwrap_or(DEFAULT_DEFERRED_TRANSITION_DELAY_MS),
            ),
            tick_interval: Duration::from_millis(
                raw.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_raw(RawTrackerConfig::default())
    }
}

/// Reservation hold settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationConfig {
    pub hold_duration: Duration,
}

impl ReservationConfig {
    fn from_raw(raw: RawReservationConfig) -> Self {
        Self {
            hold_duration: Duration::from_secs(
                raw.hold_minutes.unwrap_or(DEFAULT_HOLD_MINUTES) * 60,
            ),
        }
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self::from_raw(RawReservationConfig::default())
    }
}
