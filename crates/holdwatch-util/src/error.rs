//! Error types for holdwatch

use thiserror::Error;

use crate::ReservationId;

/// Core error type for holdwatch operations
#[derive(Debug, Error)]
pub enum HoldError {
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Invalid deadline '{value}': {message}")]
    InvalidDeadline { value: String, message: String },

    #[error("Reservation source error: {0}")]
    SourceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HoldError {
    pub fn invalid_deadline(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeadline {
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HoldError>;
