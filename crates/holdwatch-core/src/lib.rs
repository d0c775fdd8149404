//! Reservation hold tracking for holdwatch
//!
//! This crate is the heart of holdwatch, containing:
//! - The tracking session state machine (Counting -> AwaitingTransition -> Finished)
//! - The one-time expiry latch and deferred transition scheduling
//! - The cancellable async tracker that drives sessions on a tick cadence
//! - Collaborator traits: clocks, navigation, reservation lookup

mod clock;
mod events;
mod navigator;
mod session;
mod source;
mod tracker;

pub use clock::*;
pub use events::*;
pub use navigator::*;
pub use session::*;
pub use source::*;
pub use tracker::*;
