//! Reservation lookup collaborators

use async_trait::async_trait;
use holdwatch_api::Reservation;
use holdwatch_util::{HoldError, ReservationId, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Read-only access to reservation snapshots held by the reservation service
#[async_trait]
pub trait ReservationSource: Send + Sync {
    async fn lookup(&self, id: &ReservationId) -> Result<Reservation>;
}

/// In-memory source, for tests and fixed fixtures
#[derive(Debug, Clone, Default)]
pub struct StaticReservationSource {
    reservations: HashMap<ReservationId, Reservation>,
}

impl StaticReservationSource {
    pub fn new(reservations: impl IntoIterator<Item = Reservation>) -> Self {
        Self {
            reservations: reservations.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }
}

#[async_trait]
impl ReservationSource for StaticReservationSource {
    async fn lookup(&self, id: &ReservationId) -> Result<Reservation> {
        self.reservations
            .get(id)
            .cloned()
            .ok_or_else(|| HoldError::ReservationNotFound(id.clone()))
    }
}

/// Reads a JSON array of reservation snapshots on every lookup
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReservationSource for JsonFileSource {
    async fn lookup(&self, id: &ReservationId) -> Result<Reservation> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let reservations: Vec<Reservation> = serde_json::from_str(&content).map_err(|e| {
            HoldError::unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            count = reservations.len(),
            "Loaded reservation snapshots"
        );

        reservations
            .into_iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| HoldError::ReservationNotFound(id.clone()))
    }
}
