//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Countdown tracker settings
    #[serde(default)]
    pub tracker: RawTrackerConfig,

    /// Reservation hold settings
    #[serde(default)]
    pub reservations: RawReservationConfig,
}

/// Tracker settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTrackerConfig {
    /// Where to send the user once a hold expires (default: "/")
    pub fallback_redirect_path: Option<String>,

    /// Delay between expiry and the redirect (default: 3000)
    pub deferred_transition_delay_ms: Option<u64>,

    /// Countdown recompute cadence (default: 1000)
    pub tick_interval_ms: Option<u64>,
}

/// Reservation hold settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawReservationConfig {
    /// Length of a fresh hold, in minutes (default: 15)
    pub hold_minutes: Option<u64>,
}
