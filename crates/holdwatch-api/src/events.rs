//! Event types for tracker -> consumer streaming

use chrono::{DateTime, Utc};
use holdwatch_util::{ReservationId, TrackingId};
use serde::{Deserialize, Serialize};

use crate::{CountdownView, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub tracking_id: TrackingId,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(tracking_id: TrackingId, payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: holdwatch_util::now(),
            tracking_id,
            payload,
        }
    }
}

/// Everything a tracking session reports to its consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Tracking began for a reservation deadline
    TrackingStarted {
        reservation_id: Option<ReservationId>,
        /// Parsed deadline. None when the given deadline was malformed.
        expires_at: Option<DateTime<Utc>>,
    },

    /// Updated countdown
    Countdown(CountdownView),

    /// The deadline passed (fires once per session)
    Expired,

    /// The deferred transition is due
    TransitionDue { destination: String },
}
