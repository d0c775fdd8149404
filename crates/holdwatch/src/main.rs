//! holdwatch - Watch a reservation hold count down
//!
//! This is the command-line consumer of the tracker. It wires together:
//! - Configuration loading
//! - Reservation lookup (JSON snapshot file)
//! - The countdown tracker
//! - Event rendering (plain text or NDJSON)

use anyhow::{Context, Result};
use clap::Parser;
use holdwatch_api::{Event, EventPayload, Reservation};
use holdwatch_config::{load_config_or_default, Config};
use holdwatch_core::{
    JsonFileSource, LoggingNavigator, ReservationSource, SystemClock, Tracker, TrackingHandle,
};
use holdwatch_util::{default_config_path, format_datetime_full, ReservationId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// holdwatch - Reservation hold countdown
#[derive(Parser, Debug)]
#[command(name = "holdwatch")]
#[command(about = "Track a reservation hold until it expires", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/holdwatch/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// JSON file with reservation snapshots (or set HOLDWATCH_RESERVATIONS)
    #[arg(short, long, env = "HOLDWATCH_RESERVATIONS")]
    reservations: Option<PathBuf>,

    /// Reservation to track, looked up in --reservations
    #[arg(long, requires = "reservations", conflicts_with_all = ["expires_at", "new_hold"])]
    id: Option<String>,

    /// Track a raw deadline (RFC 3339) instead of a stored reservation
    #[arg(short, long, conflicts_with = "new_hold")]
    expires_at: Option<String>,

    /// Track a fresh hold of the configured length, starting now
    #[arg(long)]
    new_hold: bool,

    /// Read the wall clock on every tick instead of counting monotonic time
    #[arg(long)]
    wall_clock: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// What to hand to the tracker
enum Target {
    Reservation(Reservation),
    Deadline(Option<String>),
}

struct Watcher {
    tracker: Tracker,
    events: mpsc::UnboundedReceiver<Event>,
    json: bool,
}

impl Watcher {
    fn new(args: &Args, config: &Config) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let mut tracker = Tracker::new(config.tracker.clone(), Arc::new(LoggingNavigator))
            .with_event_sink(tx);
        if args.wall_clock {
            tracker = tracker.with_clock(Arc::new(SystemClock));
        }

        Self {
            tracker,
            events,
            json: args.json,
        }
    }

    fn start(&self, target: Target) -> TrackingHandle {
        match target {
            Target::Reservation(reservation) => {
                let now = holdwatch_util::now();
                let status = reservation.effective_status(now);
                info!(
                    reservation_id = %reservation.id,
                    status = %status,
                    "Reservation loaded"
                );
                if !self.json {
                    println!(
                        "Reservation {}: {} ({:?})",
                        reservation.id,
                        status.label(),
                        status.tone()
                    );
                }
                let id = reservation.id.clone();
                self.tracker.start_for_reservation(&reservation, move || {
                    warn!(reservation_id = %id, "Reservation hold expired");
                })
            }
            Target::Deadline(expires_at) => self.tracker.start(expires_at.as_deref(), || {
                warn!("Hold expired");
            }),
        }
    }

    async fn run(mut self, target: Target) -> Result<()> {
        let handle = self.start(target);

        if handle.is_inert() {
            info!("No pending hold deadline, nothing to track");
            if !self.json {
                println!("Nothing to track");
            }
            return Ok(());
        }

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        loop {
            tokio::select! {
                biased;

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, stopping");
                    break;
                }

                Some(event) = self.events.recv() => {
                    self.print(&event)?;
                }

                _ = handle.finished() => {
                    while let Ok(event) = self.events.try_recv() {
                        self.print(&event)?;
                    }
                    break;
                }
            }
        }

        handle.cancel();
        info!(expired = handle.is_expired(), "holdwatch stopping");
        Ok(())
    }

    fn print(&self, event: &Event) -> Result<()> {
        if self.json {
            let line = serde_json::to_string(event).context("Failed to encode event")?;
            println!("{}", line);
        } else if let Some(line) = render(&event.payload) {
            println!("{}", line);
        }
        Ok(())
    }
}

/// Human-readable line for an event, if it warrants one
fn render(payload: &EventPayload) -> Option<String> {
    match payload {
        EventPayload::TrackingStarted {
            expires_at: Some(at),
            ..
        } => Some(format!("Hold expires at {} UTC", format_datetime_full(at))),
        EventPayload::TrackingStarted { expires_at: None, .. } => None,
        EventPayload::Countdown(view) if view.has_expired => None,
        EventPayload::Countdown(view) => {
            Some(format!("{}  {}", view.formatted(), view.urgency.hint()))
        }
        EventPayload::Expired => Some(holdwatch_api::Urgency::Expired.hint().to_string()),
        EventPayload::TransitionDue { destination } => {
            Some(format!("-> {}", destination))
        }
    }
}

async fn resolve_target(args: &Args, config: &Config) -> Result<Target> {
    if let Some(id) = &args.id {
        let path = args
            .reservations
            .as_ref()
            .context("--id requires --reservations")?;
        let source = JsonFileSource::new(path);
        let reservation = source
            .lookup(&ReservationId::new(id.as_str()))
            .await
            .with_context(|| format!("Failed to look up reservation {} in {:?}", id, path))?;
        return Ok(Target::Reservation(reservation));
    }

    if args.new_hold {
        let hold = chrono::Duration::from_std(config.reservations.hold_duration)
            .context("Hold length out of range")?;
        let expires_at = holdwatch_util::now() + hold;
        return Ok(Target::Deadline(Some(expires_at.to_rfc3339())));
    }

    Ok(Target::Deadline(args.expires_at.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "holdwatch starting");

    if holdwatch_util::is_mock_time_active() {
        warn!(
            now = %format_datetime_full(&holdwatch_util::now()),
            "Mock time is active, deadlines are compared against {}",
            holdwatch_util::MOCK_TIME_ENV_VAR
        );
    }

    let config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        redirect = %config.tracker.fallback_redirect_path,
        tick_ms = config.tracker.tick_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let target = resolve_target(&args, &config).await?;
    Watcher::new(&args, &config).run(target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use holdwatch_api::CountdownView;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "holdwatch",
            "--reservations",
            "/tmp/r.json",
            "--id",
            "42",
        ])
        .unwrap();
        assert_eq!(args.id.as_deref(), Some("42"));
        assert!(!args.json);
    }

    #[test]
    fn test_id_requires_reservations() {
        let result = Args::try_parse_from(["holdwatch", "--id", "42"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_id_conflicts_with_deadline() {
        let result = Args::try_parse_from([
            "holdwatch",
            "--reservations",
            "/tmp/r.json",
            "--id",
            "42",
            "--expires-at",
            "2025-01-01T00:00:00Z",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_countdown() {
        let line = render(&EventPayload::Countdown(CountdownView::from_remaining(125)));
        assert_eq!(line.as_deref(), Some("02:05  Not much time left"));

        let line = render(&EventPayload::Countdown(CountdownView::from_remaining(42)));
        assert_eq!(line.as_deref(), Some("00:42  Hurry up!"));
    }

    #[test]
    fn test_render_expiry_and_transition() {
        assert_eq!(
            render(&EventPayload::Expired).as_deref(),
            Some("Your reservation has expired. Redirecting...")
        );
        assert_eq!(
            render(&EventPayload::TransitionDue {
                destination: "/".into()
            })
            .as_deref(),
            Some("-> /")
        );
        assert_eq!(
            render(&EventPayload::Countdown(CountdownView::expired())),
            None
        );
    }

    #[test]
    fn test_render_started() {
        let at = chrono::Utc.with_ymd_and_hms(2025, 4, 2, 9, 15, 0).unwrap();
        let line = render(&EventPayload::TrackingStarted {
            reservation_id: None,
            expires_at: Some(at),
        });
        assert_eq!(line.as_deref(), Some("Hold expires at 2025-04-02 09:15:00 UTC"));
    }

    #[tokio::test]
    async fn test_resolve_new_hold() {
        let args = Args::try_parse_from(["holdwatch", "--new-hold"]).unwrap();
        let config = Config::default();

        let before = holdwatch_util::now();
        match resolve_target(&args, &config).await.unwrap() {
            Target::Deadline(Some(raw)) => {
                let at = holdwatch_util::parse_deadline(&raw).unwrap();
                let hold = (at - before).num_seconds();
                assert!((899..=901).contains(&hold), "hold was {}s", hold);
            }
            _ => panic!("Expected a deadline"),
        }
    }
}
