//! Navigation collaborator for the deferred post-expiry transition

use std::sync::Mutex;
use tracing::info;

/// Performs the redirect once a hold has expired.
///
/// Called while the tracker holds its session lock; implementations must
/// not block for long.
pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: &str);
}

/// Navigator that only records the transition in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, destination: &str) {
        info!(destination, "Redirecting after hold expiry");
    }
}

/// Mock navigator for unit/integration testing
#[derive(Debug, Default)]
pub struct MockNavigator {
    destinations: Mutex<Vec<String>>,
}

impl MockNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every destination navigated to, in order
    pub fn destinations(&self) -> Vec<String> {
        self.destinations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.destinations().len()
    }
}

impl Navigator for MockNavigator {
    fn navigate(&self, destination: &str) {
        self.destinations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(destination.to_string());
    }
}
