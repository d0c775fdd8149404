//! Shared utilities for holdwatch
//!
//! This crate provides:
//! - ID types (ReservationId, TrackingId)
//! - Time utilities (mock-aware wall clock, monotonic time, deadline parsing)
//! - Countdown formatting
//! - Error types
//! - Default paths for the config file

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
