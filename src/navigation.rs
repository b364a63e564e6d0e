/// Hard-navigation seam used when a session ends or a login completes
use std::sync::{Mutex, PoisonError};

/// Destination the session manager can send the user to.
///
/// Implementations must not block; navigation may happen in the middle of a
/// call and callers are written assuming it can.
pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: &str);
}

/// Writes navigations to the log and the terminal (CLI front-end)
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, destination: &str) {
        tracing::info!(destination, "navigating");
        println!("➡️  {}", destination);
    }
}

/// Keeps every destination in order; used by headless callers and tests
#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<String> {
        self.visits().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: &str) {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(destination.to_string());
    }
}
