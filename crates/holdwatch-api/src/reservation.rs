//! Reservation snapshots and status transitions

use chrono::{DateTime, Utc};
use holdwatch_util::ReservationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Deadline;

/// Authoritative status of a reservation, as held by the reservation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Held, waiting for confirmation
    Pending,
    /// Confirmed and paid
    Confirmed,
    /// Canceled by the user or the system
    Canceled,
    /// Hold deadline passed
    Expired,
}

impl ReservationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Canceled => "Canceled",
            ReservationStatus::Expired => "Expired",
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self {
            ReservationStatus::Pending => StatusTone::Warning,
            ReservationStatus::Confirmed => StatusTone::Success,
            ReservationStatus::Canceled => StatusTone::Neutral,
            ReservationStatus::Expired => StatusTone::Destructive,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Canceled => "CANCELED",
            ReservationStatus::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// Visual tone used when rendering a status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Warning,
    Success,
    Neutral,
    Destructive,
}

/// Errors for illegal status transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Reservation {0} has expired")]
    Expired(ReservationId),

    #[error("Reservation {id} is {actual}, expected {expected}")]
    InvalidState {
        id: ReservationId,
        actual: ReservationStatus,
        expected: ReservationStatus,
    },

    #[error("Reservation {id} cannot be released from {actual}")]
    NotReleasable {
        id: ReservationId,
        actual: ReservationStatus,
    },
}

/// Reservation snapshot as returned by the reservation service.
///
/// `expires_at` is kept as the raw string so that a malformed value can be
/// told apart from a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,

    #[serde(default)]
    pub event_id: Option<u64>,

    #[serde(default)]
    pub quantity: Option<u32>,

    pub status: ReservationStatus,

    #[serde(default, alias = "expiresAt", alias = "hold_expires_at")]
    pub expires_at: Option<String>,
}

impl Reservation {
    pub fn new(id: impl Into<ReservationId>, status: ReservationStatus) -> Self {
        Self {
            id: id.into(),
            event_id: None,
            quantity: None,
            status,
            expires_at: None,
        }
    }

    pub fn with_deadline(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at.to_rfc3339());
        self
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::parse(self.expires_at.as_deref())
    }

    /// Pending or confirmed
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        )
    }

    /// Whether the hold deadline has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline().has_passed(now)
    }

    /// Status as it should be shown at `now`.
    ///
    /// A pending reservation past its deadline reads as expired even before
    /// the reservation service has flipped it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
        match self.status {
            ReservationStatus::Pending if self.is_expired_at(now) => ReservationStatus::Expired,
            status => status,
        }
    }

    pub fn can_be_confirmed(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && !self.is_expired_at(now)
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.can_be_confirmed(now) {
            if self.status == ReservationStatus::Pending {
                return Err(TransitionError::Expired(self.id.clone()));
            }
            return Err(TransitionError::InvalidState {
                id: self.id.clone(),
                actual: self.status,
                expected: ReservationStatus::Pending,
            });
        }
        self.status = ReservationStatus::Confirmed;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if !self.is_active() {
            return Err(TransitionError::NotReleasable {
                id: self.id.clone(),
                actual: self.status,
            });
        }
        self.status = ReservationStatus::Canceled;
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), TransitionError> {
        if self.status != ReservationStatus::Pending {
            return Err(TransitionError::InvalidState {
                id: self.id.clone(),
                actual: self.status,
                expected: ReservationStatus::Pending,
            });
        }
        self.status = ReservationStatus::Expired;
        Ok(())
    }
}
