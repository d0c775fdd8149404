//! Reservation and countdown types for holdwatch
//!
//! This crate defines the stable types exchanged between the tracker and
//! its consumers:
//! - Reservation snapshots and their status transitions
//! - Countdown views and urgency tiers
//! - Events (tracker -> presentation layer)
//! - Versioning

mod events;
mod reservation;
mod types;

pub use events::*;
pub use reservation::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
