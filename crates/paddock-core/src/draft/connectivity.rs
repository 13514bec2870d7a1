// Connection health derived from fetch outcomes.

use tracing::{info, warn};

use crate::protocol::ConnectionStatus;

/// Tracks consecutive fetch failures and maps them to a [`ConnectionStatus`].
#[derive(Debug, Clone)]
pub struct ConnectivityTracker {
    status: ConnectionStatus,
    consecutive_failures: u32,
    offline_after: u32,
    last_error: Option<String>,
}

impl ConnectivityTracker {
    /// `offline_after` consecutive failures mark the link offline. Values
    /// below 1 are treated as 1.
    pub fn new(offline_after: u32) -> Self {
        ConnectivityTracker {
            status: ConnectionStatus::Connecting,
            consecutive_failures: 0,
            offline_after: offline_after.max(1),
            last_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a successful fetch. Returns the new status if it changed.
    pub fn record_success(&mut self) -> Option<ConnectionStatus> {
        self.consecutive_failures = 0;
        self.last_error = None;
        self.transition(ConnectionStatus::Connected)
    }

    /// Record a failed fetch. Returns the new status if it changed.
    pub fn record_failure(&mut self, error: impl Into<String>) -> Option<ConnectionStatus> {
        self.consecutive_failures += 1;
        let error = error.into();
        warn!(
            failures = self.consecutive_failures,
            "Draft fetch failed: {}", error
        );
        self.last_error = Some(error);

        let next = if self.consecutive_failures >= self.offline_after {
            ConnectionStatus::Offline
        } else if self.status == ConnectionStatus::Connecting {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Error
        };
        self.transition(next)
    }

    fn transition(&mut self, next: ConnectionStatus) -> Option<ConnectionStatus> {
        if self.status == next {
            return None;
        }
        info!("Connection status: {:?} -> {:?}", self.status, next);
        self.status = next;
        Some(next)
    }
}
