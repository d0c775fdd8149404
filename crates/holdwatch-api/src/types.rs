//! Countdown view types

use chrono::{DateTime, Utc};
use holdwatch_util::{format_countdown, parse_deadline, remaining_secs_until};
use serde::{Deserialize, Serialize};

/// Remaining time at or below which a hold is critical
pub const CRITICAL_THRESHOLD_SECS: u64 = 60;

/// Remaining time at or below which a hold is a warning
pub const WARNING_THRESHOLD_SECS: u64 = 300;

/// How urgent the remaining time on a hold is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// More than five minutes left
    Normal,
    /// Between one and five minutes left
    Warning,
    /// One minute or less left
    Critical,
    /// The deadline has passed
    Expired,
}

impl Urgency {
    /// Tier for a countdown. 60 and 300 fall in the more urgent tier.
    pub fn from_remaining(remaining_secs: u64, has_expired: bool) -> Self {
        if has_expired {
            Urgency::Expired
        } else if remaining_secs <= CRITICAL_THRESHOLD_SECS {
            Urgency::Critical
        } else if remaining_secs <= WARNING_THRESHOLD_SECS {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }

    /// Short prompt shown next to the countdown
    pub fn hint(&self) -> &'static str {
        match self {
            Urgency::Normal => "Confirm your reservation",
            Urgency::Warning => "Not much time left",
            Urgency::Critical => "Hurry up!",
            Urgency::Expired => "Your reservation has expired. Redirecting...",
        }
    }
}

/// Derived countdown state for one reservation. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownView {
    pub remaining_seconds: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub has_expired: bool,
    pub urgency: Urgency,
}

impl CountdownView {
    /// Compute the view for `deadline` as seen at `now`
    pub fn at(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_remaining(remaining_secs_until(deadline, now))
    }

    /// Build a view from whole seconds remaining. Zero means expired.
    pub fn from_remaining(remaining_seconds: u64) -> Self {
        let has_expired = remaining_seconds == 0;
        Self {
            remaining_seconds,
            minutes: remaining_seconds / 60,
            seconds: remaining_seconds % 60,
            has_expired,
            urgency: Urgency::from_remaining(remaining_seconds, has_expired),
        }
    }

    /// The terminal view
    pub fn expired() -> Self {
        Self::from_remaining(0)
    }

    /// `MM:SS` (or `HH:MM:SS`) rendering of the remaining time
    pub fn formatted(&self) -> String {
        format_countdown(self.remaining_seconds)
    }
}

/// A reservation deadline as received from the reservation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deadline {
    /// No deadline known; nothing to track
    None,
    /// A valid absolute deadline
    At(DateTime<Utc>),
    /// A deadline was given but could not be parsed
    Invalid(String),
}

impl Deadline {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None => Deadline::None,
            Some(raw) => match parse_deadline(raw) {
                Ok(dt) => Deadline::At(dt),
                Err(_) => Deadline::Invalid(raw.to_string()),
            },
        }
    }

    /// Whether the deadline counts as passed at `now`.
    ///
    /// Unparseable deadlines always count as passed.
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Deadline::None => false,
            Deadline::At(dt) => now >= *dt,
            Deadline::Invalid(_) => true,
        }
    }

    /// Countdown view at `now`, if there is anything to count down
    pub fn view_at(&self, now: DateTime<Utc>) -> Option<CountdownView> {
        match self {
            Deadline::None => None,
            Deadline::At(dt) => Some(CountdownView::at(*dt, now)),
            Deadline::Invalid(_) => Some(CountdownView::expired()),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Deadline {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(dt) => Deadline::At(dt),
            None => Deadline::None,
        }
    }
}
