//! Core events emitted by tracking sessions

use holdwatch_api::{CountdownView, EventPayload};

/// Events emitted by a tracking session tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The countdown view changed
    Countdown(CountdownView),

    /// The deadline was crossed (emitted once per session)
    ExpireDue,

    /// The deferred transition is due (emitted once per session)
    TransitionDue { destination: String },
}

impl From<CoreEvent> for EventPayload {
    fn from(event: CoreEvent) -> Self {
        match event {
            CoreEvent::Countdown(view) => EventPayload::Countdown(view),
            CoreEvent::ExpireDue => EventPayload::Expired,
            CoreEvent::TransitionDue { destination } => EventPayload::TransitionDue { destination },
        }
    }
}
