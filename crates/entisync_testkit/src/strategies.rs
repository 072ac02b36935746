//! Sync strategies for tests.

use async_trait::async_trait;
use entisync_core::{SyncError, SyncResult, SyncStrategy};
use entisync_protocol::{Event, SyncStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A strategy that answers pushes from a script.
///
/// Each push pops the next scripted answer; once the script is exhausted
/// every push is confirmed.
#[derive(Debug, Default)]
pub struct ScriptedStrategy {
    script: Mutex<VecDeque<SyncResult<SyncStatus>>>,
    pushed: Mutex<Vec<Event>>,
}

impl ScriptedStrategy {
    /// Creates a strategy with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an answer to the script.
    #[must_use]
    pub fn then(self, answer: SyncResult<SyncStatus>) -> Self {
        self.script.lock().push_back(answer);
        self
    }

    /// Appends a retryable transport failure to the script.
    #[must_use]
    pub fn then_fail(self) -> Self {
        self.then(Err(SyncError::transport_retryable("connection reset")))
    }

    /// Returns every event offered so far.
    pub fn pushed(&self) -> Vec<Event> {
        self.pushed.lock().clone()
    }

    /// Returns the ids of the events offered so far.
    pub fn pushed_ids(&self) -> Vec<String> {
        self.pushed
            .lock()
            .iter()
            .map(|e| e.event_id().to_string())
            .collect()
    }
}

#[async_trait]
impl SyncStrategy for ScriptedStrategy {
    async fn push_one(&self, event: &Event) -> SyncResult<SyncStatus> {
        self.pushed.lock().push(event.clone());
        self.script.lock().pop_front().unwrap_or(Ok(SyncStatus::Ok))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A strategy whose pushes wait until the test releases them.
///
/// While closed, every push parks after recording its event, which lets a
/// test interleave local writes with a push that is in flight.
#[derive(Debug)]
pub struct GatedStrategy {
    closed: AtomicBool,
    gate: Semaphore,
    pushed: Mutex<Vec<Event>>,
}

impl GatedStrategy {
    /// Creates a strategy with the gate closed.
    pub fn closed() -> Self {
        Self {
            closed: AtomicBool::new(true),
            gate: Semaphore::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Lets one parked (or future) push complete.
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    /// Opens the gate for good.
    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Returns every event offered so far.
    pub fn pushed(&self) -> Vec<Event> {
        self.pushed.lock().clone()
    }

    /// Waits until at least `count` pushes have started.
    pub async fn wait_for_pushes(&self, count: usize) {
        while self.pushed.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl SyncStrategy for GatedStrategy {
    async fn push_one(&self, event: &Event) -> SyncResult<SyncStatus> {
        self.pushed.lock().push(event.clone());
        if self.closed.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.map_err(|_| SyncError::NotConnected)?;
            permit.forget();
        }
        Ok(SyncStatus::Ok)
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entisync_codec::Value;
    use std::sync::Arc;

    fn event() -> Event {
        Event::create_insert("notes", "1", Value::map([("id", Value::from("1"))]), true)
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let strategy = ScriptedStrategy::new()
            .then(Ok(SyncStatus::Failed))
            .then_fail();

        assert_eq!(strategy.push_one(&event()).await, Ok(SyncStatus::Failed));
        assert!(strategy.push_one(&event()).await.is_err());
        assert_eq!(strategy.push_one(&event()).await, Ok(SyncStatus::Ok));
        assert_eq!(strategy.pushed().len(), 3);
    }

    #[tokio::test]
    async fn test_gate_parks_until_released() {
        let strategy = Arc::new(GatedStrategy::closed());
        let task = {
            let strategy = Arc::clone(&strategy);
            tokio::spawn(async move { strategy.push_one(&event()).await })
        };

        strategy.wait_for_pushes(1).await;
        assert!(!task.is_finished());

        strategy.release_one();
        assert_eq!(task.await.unwrap(), Ok(SyncStatus::Ok));
    }
}
