//! Configuration validation

use crate::schema::{RawConfig, RawReservationConfig, RawTrackerConfig};
use thiserror::Error;

/// Longest accepted tick interval
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Longest accepted delay before the post-expiry redirect
pub const MAX_DEFERRED_TRANSITION_DELAY_MS: u64 = 600_000;

/// Accepted hold lengths, in minutes
pub const HOLD_MINUTES_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid redirect path '{path}': {message}")]
    InvalidRedirectPath { path: String, message: String },

    #[error("tick_interval_ms must be between 1 and {max}, got {value}")]
    TickIntervalOutOfRange { value: u64, max: u64 },

    #[error("deferred_transition_delay_ms must be at most {max}, got {value}")]
    TransitionDelayTooLong { value: u64, max: u64 },

    #[error("hold_minutes must be between 1 and 60, got {0}")]
    HoldMinutesOutOfRange(u64),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_tracker(&config.tracker);
    errors.extend(validate_reservations(&config.reservations));
    errors
}

fn validate_tracker(tracker: &RawTrackerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(path) = &tracker.fallback_redirect_path
        && let Err(message) = check_redirect_path(path)
    {
        errors.push(ValidationError::InvalidRedirectPath {
            path: path.clone(),
            message,
        });
    }

    if let Some(tick) = tracker.tick_interval_ms
        && (tick == 0 || tick > MAX_TICK_INTERVAL_MS)
    {
        errors.push(ValidationError::TickIntervalOutOfRange {
            value: tick,
            max: MAX_TICK_INTERVAL_MS,
        });
    }

    if let Some(delay) = tracker.deferred_transition_delay_ms
        && delay > MAX_DEFERRED_TRANSITION_DELAY_MS
    {
        errors.push(ValidationError::TransitionDelayTooLong {
            value: delay,
            max: MAX_DEFERRED_TRANSITION_DELAY_MS,
        });
    }

    errors
}

fn validate_reservations(reservations: &RawReservationConfig) -> Vec<ValidationError> {
    match reservations.hold_minutes {
        Some(minutes) if !HOLD_MINUTES_RANGE.contains(&minutes) => {
            vec![ValidationError::HoldMinutesOutOfRange(minutes)]
        }
        _ => Vec::new(),
    }
}

/// Redirect targets are in-app absolute paths
pub fn check_redirect_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("cannot be empty".into());
    }
    if !path.starts_with('/') {
        return Err("must start with '/'".into());
    }
    if path.starts_with("//") {
        return Err("must not point at another host".into());
    }
    if path.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace".into());
    }
    Ok(())
}
