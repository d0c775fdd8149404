//! Tracking session state machine

use chrono::{DateTime, Utc};
use holdwatch_api::{CountdownView, Deadline, Reservation, ReservationStatus};
use holdwatch_config::TrackerConfig;
use holdwatch_util::{MonotonicInstant, ReservationId, TrackingId};
use std::time::Duration;

use crate::CoreEvent;

/// Everything a session needs to know up front
#[derive(Debug, Clone)]
pub struct TrackingPlan {
    pub tracking_id: TrackingId,
    pub reservation_id: Option<ReservationId>,
    pub deadline: Deadline,
    /// Report expiry on the first tick regardless of the deadline
    pub already_expired: bool,
    pub fallback_redirect_path: String,
    pub transition_delay: Duration,
}

impl TrackingPlan {
    pub fn new(deadline: Deadline, config: &TrackerConfig) -> Self {
        Self {
            tracking_id: TrackingId::new(),
            reservation_id: None,
            deadline,
            already_expired: false,
            fallback_redirect_path: config.fallback_redirect_path.clone(),
            transition_delay: config.deferred_transition_delay,
        }
    }

    /// Plan for a reservation snapshot.
    ///
    /// Only pending holds count down. Expired reservations start expired
    /// and settled ones (confirmed, canceled) are not tracked at all.
    pub fn for_reservation(reservation: &Reservation, config: &TrackerConfig) -> Self {
        let (deadline, already_expired) = match reservation.status {
            ReservationStatus::Pending => (reservation.deadline(), false),
            ReservationStatus::Expired => (reservation.deadline(), true),
            ReservationStatus::Confirmed | ReservationStatus::Canceled => (Deadline::None, false),
        };

        Self {
            reservation_id: Some(reservation.id.clone()),
            already_expired,
            ..Self::new(deadline, config)
        }
    }

    pub fn is_inert(&self) -> bool {
        self.deadline == Deadline::None && !self.already_expired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Nothing to track
    Inert,
    /// Counting down toward the deadline
    Counting,
    /// Expired, waiting for the deferred transition
    AwaitingTransition,
    /// Transition issued
    Finished,
    Cancelled,
}

/// A single tracked hold, advanced with explicit instants
#[derive(Debug)]
pub struct TrackingSession {
    pub plan: TrackingPlan,
    state: TrackingState,
    last_view: Option<CountdownView>,
    expired: bool,
    transition_due: Option<MonotonicInstant>,
}

impl TrackingSession {
    pub fn new(plan: TrackingPlan) -> Self {
        let state = if plan.is_inert() {
            TrackingState::Inert
        } else {
            TrackingState::Counting
        };

        Self {
            plan,
            state,
            last_view: None,
            expired: false,
            transition_due: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Most recently published view
    pub fn last_view(&self) -> Option<CountdownView> {
        self.last_view
    }

    /// Latched once the deadline has been crossed
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// When the deferred transition fires, once expiry has happened
    pub fn transition_due_at(&self) -> Option<MonotonicInstant> {
        self.transition_due
    }

    /// True once the session will never emit another event
    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            TrackingState::Inert | TrackingState::Finished | TrackingState::Cancelled
        )
    }

    fn current_view(&self, now: DateTime<Utc>) -> CountdownView {
        if self.plan.already_expired {
            return CountdownView::expired();
        }
        self.plan
            .deadline
            .view_at(now)
            .unwrap_or_else(CountdownView::expired)
    }

    /// Advance the session to `now`.
    ///
    /// Views are only reported when the remaining time drops, so the
    /// published sequence is strictly decreasing even if the wall clock
    /// steps backwards.
    pub fn tick(&mut self, now: DateTime<Utc>, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        if self.state == TrackingState::Counting {
            let view = self.current_view(now);
            let dropped = self
                .last_view
                .is_none_or(|last| view.remaining_seconds < last.remaining_seconds);

            if dropped {
                self.last_view = Some(view);
                events.push(CoreEvent::Countdown(view));
            }

            if view.has_expired {
                self.expired = true;
                self.state = TrackingState::AwaitingTransition;
                // An unrepresentable delay transitions right away
                self.transition_due = Some(
                    now_mono
                        .checked_add(self.plan.transition_delay)
                        .unwrap_or(now_mono),
                );
                events.push(CoreEvent::ExpireDue);
            }
        }

        if self.state == TrackingState::AwaitingTransition
            && let Some(due) = self.transition_due
            && now_mono >= due
        {
            self.state = TrackingState::Finished;
            events.push(CoreEvent::TransitionDue {
                destination: self.plan.fallback_redirect_path.clone(),
            });
        }

        events
    }

    /// Stop the session. Returns false if it had already finished.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            TrackingState::Finished | TrackingState::Cancelled => false,
            _ => {
                self.state = TrackingState::Cancelled;
                self.transition_due = None;
                true
            }
        }
    }
}
