//! Async driver for tracking sessions
//!
//! Each tracked hold gets one tokio task that advances a [`TrackingSession`]
//! on the configured tick cadence and performs the side effects it asks for:
//! publishing views, running the expiry callback, navigating once the
//! deferred transition is due.
//!
//! Every side effect runs under the session lock and re-checks the
//! cancellation flag first, so once [`TrackingHandle::cancel`] returns
//! nothing else is published, called or navigated.

use chrono::{DateTime, Utc};
use holdwatch_api::{CountdownView, Deadline, Event, EventPayload, Reservation};
use holdwatch_config::TrackerConfig;
use holdwatch_util::{MonotonicInstant, TrackingId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{Clock, CoreEvent, MonotonicClock, Navigator, TrackingPlan, TrackingSession, TrackingState};

/// Callback run once when a tracked hold expires
pub type ExpireCallback = Box<dyn FnOnce() + Send + 'static>;

/// Starts tracking sessions with shared settings and collaborators
#[derive(Clone)]
pub struct Tracker {
    config: TrackerConfig,
    clock: Option<Arc<dyn Clock>>,
    navigator: Arc<dyn Navigator>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl Tracker {
    /// Sessions default to a [`MonotonicClock`] anchored when they start.
    pub fn new(config: TrackerConfig, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            config,
            clock: None,
            navigator,
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Forward every session event to `sink`
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<Event>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Track a deadline as received from the reservation service.
    ///
    /// A malformed deadline is tracked as already expired.
    pub fn start<F>(&self, expires_at: Option<&str>, on_expire: F) -> TrackingHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Deadline::parse(expires_at);
        if let Deadline::Invalid(raw) = &deadline {
            warn!(expires_at = %raw, "Unparseable hold deadline, treating as expired");
        }
        self.start_plan(TrackingPlan::new(deadline, &self.config), Box::new(on_expire))
    }

    /// Track an already parsed deadline
    pub fn start_at<F>(&self, expires_at: Option<DateTime<Utc>>, on_expire: F) -> TrackingHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_plan(
            TrackingPlan::new(Deadline::from(expires_at), &self.config),
            Box::new(on_expire),
        )
    }

    /// Track a reservation snapshot according to its status
    pub fn start_for_reservation<F>(&self, reservation: &Reservation, on_expire: F) -> TrackingHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if let Deadline::Invalid(raw) = reservation.deadline() {
            warn!(
                reservation_id = %reservation.id,
                expires_at = %raw,
                "Unparseable hold deadline, treating as expired"
            );
        }
        self.start_plan(
            TrackingPlan::for_reservation(reservation, &self.config),
            Box::new(on_expire),
        )
    }

    /// Start a session from an explicit plan.
    ///
    /// The first tick runs before this returns, so the handle already holds
    /// a view for any trackable deadline. Outside a tokio runtime nothing
    /// can drive the countdown, and the session starts inert.
    pub fn start_plan(&self, mut plan: TrackingPlan, on_expire: ExpireCallback) -> TrackingHandle {
        let tracking_id = plan.tracking_id;
        let runtime = match Handle::try_current() {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                warn!(
                    tracking_id = %tracking_id,
                    error = %e,
                    "No tokio runtime, hold will not be tracked"
                );
                plan.deadline = Deadline::None;
                plan.already_expired = false;
                None
            }
        };
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let session = TrackingSession::new(plan);
        let inert = session.state() == TrackingState::Inert;

        if let Some(events) = &self.events {
            let expires_at = match session.plan.deadline {
                Deadline::At(dt) => Some(dt),
                _ => None,
            };
            let _ = events.send(Event::new(
                tracking_id,
                EventPayload::TrackingStarted {
                    reservation_id: session.plan.reservation_id.clone(),
                    expires_at,
                },
            ));
        }

        info!(
            tracking_id = %tracking_id,
            reservation_id = ?session.plan.reservation_id,
            deadline = ?session.plan.deadline,
            "Tracking started"
        );

        let (views, _) = watch::channel(None);
        let (done, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            tracking_id,
            cancelled: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            dispatch_thread: Mutex::new(None),
            task: Mutex::new(None),
            views,
            done,
            inner: Mutex::new(Inner {
                session,
                clock,
                on_expire: Some(on_expire),
                navigator: self.navigator.clone(),
                events: self.events.clone(),
            }),
        });

        match (shared.step(), runtime) {
            (Step::Done, _) | (_, None) => {
                shared.done.send_replace(true);
            }
            (first, Some(runtime)) => {
                let period = self.config.tick_interval.max(Duration::from_millis(1));
                let first_tick = Instant::now() + period;
                let task = runtime.spawn(drive(shared.clone(), first, first_tick, period));
                *lock(&shared.task) = Some(task.abort_handle());
            }
        }

        TrackingHandle { shared, inert }
    }
}

enum Step {
    Continue,
    TransitionAt(MonotonicInstant),
    Done,
}

struct Inner {
    session: TrackingSession,
    clock: Arc<dyn Clock>,
    on_expire: Option<ExpireCallback>,
    navigator: Arc<dyn Navigator>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

struct Shared {
    tracking_id: TrackingId,
    cancelled: AtomicBool,
    expired: AtomicBool,
    /// Thread currently running side effects, if any
    dispatch_thread: Mutex<Option<ThreadId>>,
    task: Mutex<Option<AbortHandle>>,
    views: watch::Sender<Option<CountdownView>>,
    done: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn dispatching_on_current_thread(&self) -> bool {
        *lock(&self.dispatch_thread) == Some(thread::current().id())
    }

    /// Advance the session once and run whatever it emitted
    fn step(&self) -> Step {
        let mut inner = lock(&self.inner);
        if self.is_cancelled() {
            inner.session.cancel();
            return Step::Done;
        }

        let now = inner.clock.now();
        let events = inner.session.tick(now, MonotonicInstant::now());

        *lock(&self.dispatch_thread) = Some(thread::current().id());
        for event in events {
            if self.is_cancelled() {
                break;
            }
            self.dispatch(&mut inner, event);
        }
        *lock(&self.dispatch_thread) = None;

        if self.is_cancelled() {
            inner.session.cancel();
            return Step::Done;
        }

        match inner.session.state() {
            TrackingState::Counting => Step::Continue,
            TrackingState::AwaitingTransition => match inner.session.transition_due_at() {
                Some(due) => Step::TransitionAt(due),
                None => Step::Done,
            },
            TrackingState::Inert | TrackingState::Finished | TrackingState::Cancelled => {
                Step::Done
            }
        }
    }

    fn dispatch(&self, inner: &mut Inner, event: CoreEvent) {
        match &event {
            CoreEvent::Countdown(view) => {
                debug!(
                    tracking_id = %self.tracking_id,
                    remaining_secs = view.remaining_seconds,
                    urgency = ?view.urgency,
                    "Countdown"
                );
                self.views.send_replace(Some(*view));
            }
            CoreEvent::ExpireDue => {
                info!(
                    tracking_id = %self.tracking_id,
                    reservation_id = ?inner.session.plan.reservation_id,
                    "Hold expired"
                );
                self.expired.store(true, Ordering::SeqCst);
                if let Some(on_expire) = inner.on_expire.take() {
                    on_expire();
                }
            }
            CoreEvent::TransitionDue { destination } => {
                info!(
                    tracking_id = %self.tracking_id,
                    destination = %destination,
                    "Running deferred transition"
                );
                inner.navigator.navigate(destination);
            }
        }

        if let Some(events) = &inner.events {
            let _ = events.send(Event::new(self.tracking_id, event.into()));
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }

        // From inside a callback the lock is already held by this thread;
        // step() finishes the cancellation once the callback returns.
        if !self.dispatching_on_current_thread() {
            let mut inner = lock(&self.inner);
            if inner.session.cancel() {
                debug!(tracking_id = %self.tracking_id, "Tracking cancelled");
            }
        }

        self.done.send_replace(true);
    }
}

async fn drive(shared: Arc<Shared>, mut next: Step, first_tick: Instant, period: Duration) {
    let mut interval = tokio::time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        match next {
            Step::Continue => {
                interval.tick().await;
            }
            Step::TransitionAt(due) => {
                tokio::time::sleep_until(due.into_tokio()).await;
            }
            Step::Done => break,
        }
        next = shared.step();
    }

    shared.done.send_replace(true);
}

/// Handle to a running tracking session. Dropping it cancels the session.
pub struct TrackingHandle {
    shared: Arc<Shared>,
    inert: bool,
}

impl TrackingHandle {
    pub fn tracking_id(&self) -> TrackingId {
        self.shared.tracking_id
    }

    /// Watch the countdown view. `None` means there is nothing to track.
    pub fn subscribe(&self) -> watch::Receiver<Option<CountdownView>> {
        self.shared.views.subscribe()
    }

    /// Latest published view
    pub fn view(&self) -> Option<CountdownView> {
        *self.shared.views.borrow()
    }

    /// Whether the session had no deadline to track
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    pub fn is_expired(&self) -> bool {
        self.shared.expired.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Stop ticking and drop any pending transition.
    ///
    /// Safe to call more than once, and from within the expiry callback.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// A cloneable cancel handle that does not cancel on drop
    pub fn canceller(&self) -> Canceller {
        Canceller(self.shared.clone())
    }

    /// Resolves once the session can emit nothing more
    pub async fn finished(&self) {
        let mut done = self.shared.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

/// Cancels a tracking session from elsewhere, e.g. the expiry callback
#[derive(Clone)]
pub struct Canceller(Arc<Shared>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNavigator;
    use chrono::TimeZone;
    use holdwatch_api::{ReservationStatus, Urgency};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 8, 20, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        anchor() + chrono::Duration::seconds(n)
    }

    fn make_tracker(navigator: Arc<MockNavigator>) -> Tracker {
        Tracker::new(TrackerConfig::default(), navigator)
            .with_clock(Arc::new(MonotonicClock::anchored_at(anchor())))
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let cb_count = count.clone();
        (count, move || {
            cb_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_scenario() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(125)), on_expire);

        let view = handle.view().unwrap();
        assert_eq!((view.minutes, view.seconds), (2, 5));
        assert_eq!(view.urgency, Urgency::Warning);

        sleep(Duration::from_millis(65_500)).await;
        let view = handle.view().unwrap();
        assert_eq!((view.minutes, view.seconds), (1, 0));
        assert_eq!(view.urgency, Urgency::Critical);
        assert!(!handle.is_expired());

        sleep(Duration::from_secs(60)).await; // t = 125.5
        assert!(handle.is_expired());
        assert_eq!(handle.view(), Some(CountdownView::expired()));
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(nav.count(), 0);

        sleep(Duration::from_secs(2)).await; // t = 127.5
        assert_eq!(nav.count(), 0);

        sleep(Duration::from_secs(1)).await; // t = 128.5
        assert_eq!(nav.destinations(), vec!["/".to_string()]);

        handle.finished().await;
        sleep(Duration::from_secs(30)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_expires_immediately() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(-90)), on_expire);

        let view = handle.view().unwrap();
        assert!(view.has_expired);
        assert_eq!(view.remaining_seconds, 0);
        assert_eq!(expired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_deadline_expires_immediately() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start(Some("not-a-timestamp"), on_expire);

        assert!(handle.is_expired());
        assert_eq!(handle.view(), Some(CountdownView::expired()));
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rfc3339_string_deadline() {
        let nav = Arc::new(MockNavigator::new());
        let handle = make_tracker(nav).start(Some("2025-11-08T20:10:00Z"), || {});

        assert_eq!(handle.view().map(|v| v.remaining_seconds), Some(600));
        assert_eq!(handle.view().map(|v| v.urgency), Some(Urgency::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_urgency_moves_to_warning_at_five_minutes() {
        let nav = Arc::new(MockNavigator::new());
        let handle = make_tracker(nav).start_at(Some(secs(302)), || {});
        assert_eq!(handle.view().map(|v| v.urgency), Some(Urgency::Normal));

        sleep(Duration::from_millis(1500)).await;
        let view = handle.view().unwrap();
        assert_eq!(view.remaining_seconds, 301);
        assert_eq!(view.urgency, Urgency::Normal);

        sleep(Duration::from_secs(1)).await;
        let view = handle.view().unwrap();
        assert_eq!(view.remaining_seconds, 300);
        assert_eq!(view.urgency, Urgency::Warning);
        assert_eq!(view.formatted(), "05:00");
    }

    #[test]
    fn test_start_outside_runtime_is_inert() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(-5)), on_expire);

        assert!(handle.is_inert());
        assert_eq!(handle.view(), None);
        assert!(!handle.is_expired());
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_from_other_thread_during_expiry_callback() {
        let nav = Arc::new(MockNavigator::new());
        let config = TrackerConfig {
            deferred_transition_delay: Duration::ZERO,
            tick_interval: Duration::from_millis(20),
            ..TrackerConfig::default()
        };
        let tracker = Tracker::new(config, nav.clone())
            .with_clock(Arc::new(MonotonicClock::anchored_at(anchor())));

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let handle = tracker.start_at(
            Some(anchor() + chrono::Duration::milliseconds(100)),
            move || {
                let _ = entered_tx.send(thread::current().id());
                thread::sleep(Duration::from_millis(300));
            },
        );
        assert!(!handle.is_expired());

        let canceller = handle.canceller();
        let nav_seen = nav.clone();
        let other = thread::spawn(move || {
            let callback_thread = entered_rx.recv().unwrap();
            assert_ne!(callback_thread, thread::current().id());
            canceller.cancel();
            nav_seen.count()
        });
        let nav_after_cancel = tokio::task::spawn_blocking(move || other.join().unwrap())
            .await
            .unwrap();

        assert_eq!(nav_after_cancel, 0);
        assert!(handle.is_expired());
        assert!(handle.is_cancelled());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(nav.count(), 0);
        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_deadline_is_inert() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start(None, on_expire);

        assert!(handle.is_inert());
        assert_eq!(handle.view(), None);
        handle.finished().await;

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadline() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(10)), on_expire);

        sleep(Duration::from_millis(3500)).await;
        handle.cancel();
        let frozen = handle.view();
        assert_eq!(frozen.map(|v| v.remaining_seconds), Some(7));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.view(), frozen);
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert_eq!(nav.count(), 0);
        assert!(handle.is_cancelled());
        assert!(!handle.is_expired());
        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_transition_wait() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(2)), on_expire);

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 1);

        handle.cancel();
        handle.cancel();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_expiry_callback() {
        let nav = Arc::new(MockNavigator::new());
        let slot: Arc<Mutex<Option<Canceller>>> = Arc::new(Mutex::new(None));
        let cb_slot = slot.clone();

        let handle = make_tracker(nav.clone()).start_at(Some(secs(2)), move || {
            if let Some(canceller) = cb_slot.lock().unwrap().take() {
                canceller.cancel();
            }
        });
        *slot.lock().unwrap() = Some(handle.canceller());

        sleep(Duration::from_secs(10)).await;
        assert!(handle.is_expired());
        assert!(handle.is_cancelled());
        assert_eq!(nav.count(), 0);
        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let nav = Arc::new(MockNavigator::new());
        let (expired, on_expire) = counter();
        let handle = make_tracker(nav.clone()).start_at(Some(secs(5)), on_expire);
        drop(handle);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(expired.load(Ordering::SeqCst), 0);
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_decreasing_views() {
        let nav = Arc::new(MockNavigator::new());
        let handle = make_tracker(nav).start_at(Some(secs(3)), || {});
        let mut rx = handle.subscribe();

        let mut seen = vec![rx.borrow_and_update().unwrap().remaining_seconds];
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().unwrap();
            seen.push(view.remaining_seconds);
            if view.has_expired {
                break;
            }
        }

        assert_eq!(seen, vec![3, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_sink_order() {
        let nav = Arc::new(MockNavigator::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = make_tracker(nav).with_event_sink(tx);

        let reservation =
            Reservation::new("42", ReservationStatus::Pending).with_deadline(secs(1));
        let handle = tracker.start_for_reservation(&reservation, || {});
        handle.finished().await;
        drop(handle);
        drop(tracker);

        let mut payloads = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.api_version, holdwatch_api::API_VERSION);
            payloads.push(event.payload);
        }

        assert!(matches!(
            &payloads[0],
            EventPayload::TrackingStarted { reservation_id: Some(id), expires_at: Some(_) }
                if id.as_str() == "42"
        ));
        assert_eq!(
            payloads[1],
            EventPayload::Countdown(CountdownView::from_remaining(1))
        );
        assert_eq!(payloads[2], EventPayload::Countdown(CountdownView::expired()));
        assert_eq!(payloads[3], EventPayload::Expired);
        assert_eq!(
            payloads[4],
            EventPayload::TransitionDue {
                destination: "/".into()
            }
        );
        assert_eq!(payloads.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_reservation_is_inert() {
        let nav = Arc::new(MockNavigator::new());
        let reservation =
            Reservation::new("7", ReservationStatus::Confirmed).with_deadline(secs(-10));
        let handle = make_tracker(nav.clone()).start_for_reservation(&reservation, || {});

        assert!(handle.is_inert());
        assert_eq!(handle.view(), None);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_redirect_and_delay() {
        let nav = Arc::new(MockNavigator::new());
        let config = TrackerConfig {
            fallback_redirect_path: "/events".into(),
            deferred_transition_delay: Duration::from_millis(500),
            tick_interval: Duration::from_millis(250),
        };
        let tracker = Tracker::new(config, nav.clone())
            .with_clock(Arc::new(MonotonicClock::anchored_at(anchor())));

        let handle = tracker.start_at(Some(secs(1)), || {});
        sleep(Duration::from_millis(1400)).await;
        assert!(handle.is_expired());
        assert_eq!(nav.count(), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(nav.destinations(), vec!["/events".to_string()]);
    }
}
