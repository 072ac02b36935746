//! Sync strategy abstraction.

use async_trait::async_trait;
use entisync_protocol::{Event, SyncStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Result type for strategy operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors a strategy may report for a push.
///
/// The repository records any error as [`SyncStatus::Failed`]; the event is
/// offered again on the next sync cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote rejected the event.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to remote")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::Rejected(_) => false,
        }
    }
}

/// A sync strategy moves local events to a remote.
///
/// Strategies own their transport. They receive each pending event through
/// [`push_one`](SyncStrategy::push_one) and feed remote changes back with
/// [`Repository::merge_remote_event`](crate::Repository::merge_remote_event).
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Offers one event to the remote and returns the resulting status.
    ///
    /// `Ok(SyncStatus::Ok)` confirms the event. `Ok(SyncStatus::Pending)`
    /// leaves it unconfirmed without counting as a failure. An `Err` counts
    /// as [`SyncStatus::Failed`].
    async fn push_one(&self, event: &Event) -> SyncResult<SyncStatus>;

    /// Returns a name used in logs.
    fn name(&self) -> &str {
        "strategy"
    }
}

/// A strategy for testing that answers every push with a fixed outcome.
#[derive(Debug)]
pub struct MockStrategy {
    connected: AtomicBool,
    status: Mutex<SyncStatus>,
    pushed: Mutex<Vec<Event>>,
}

impl MockStrategy {
    /// Creates a connected mock that confirms every event.
    pub fn new() -> Self {
        Self::with_status(SyncStatus::Ok)
    }

    /// Creates a connected mock answering with `status`.
    pub fn with_status(status: SyncStatus) -> Self {
        Self {
            connected: AtomicBool::new(true),
            status: Mutex::new(status),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Sets the status returned by later pushes.
    pub fn set_status(&self, status: SyncStatus) {
        *self.status.lock() = status;
    }

    /// Sets the connected state. A disconnected mock fails every push.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every event offered so far.
    pub fn pushed(&self) -> Vec<Event> {
        self.pushed.lock().clone()
    }
}

impl Default for MockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStrategy for MockStrategy {
    async fn push_one(&self, event: &Event) -> SyncResult<SyncStatus> {
        self.pushed.lock().push(event.clone());
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        Ok(*self.status.lock())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entisync_codec::Value;

    fn event() -> Event {
        Event::create_insert("notes", "1", Value::map([("id", Value::from("1"))]), true)
    }

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Rejected("schema".into()).is_retryable());
    }

    #[tokio::test]
    async fn mock_strategy_answers() {
        let strategy = MockStrategy::new();
        assert_eq!(strategy.push_one(&event()).await, Ok(SyncStatus::Ok));

        strategy.set_status(SyncStatus::Failed);
        assert_eq!(strategy.push_one(&event()).await, Ok(SyncStatus::Failed));

        strategy.set_connected(false);
        assert_eq!(strategy.push_one(&event()).await, Err(SyncError::NotConnected));
        assert_eq!(strategy.pushed().len(), 3);
    }
}
