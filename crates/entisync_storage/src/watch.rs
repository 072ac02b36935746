//! Watch listener registry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<()>,
}

/// Listeners waiting for writes, keyed by repository name.
///
/// Notifications carry no data; a listener re-runs its query when woken.
/// Closed listeners are pruned whenever a notification finds them.
#[derive(Default)]
pub struct WatchRegistry {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a listener for `repository`.
    ///
    /// The listener stays registered until the returned guard is dropped or
    /// the registry is closed; after that the receiver yields `None`.
    pub fn subscribe(
        self: &Arc<Self>,
        repository: &str,
    ) -> (WatchGuard, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.listeners
            .lock()
            .entry(repository.to_string())
            .or_default()
            .push(Listener { id, tx });

        let guard = WatchGuard {
            registry: Arc::downgrade(self),
            repository: repository.to_string(),
            id,
        };
        (guard, rx)
    }

    /// Wakes every listener of `repository`.
    ///
    /// Senders are snapshotted first, so listeners may subscribe or drop
    /// concurrently.
    pub fn notify(&self, repository: &str) {
        let snapshot = self.snapshot(Some(repository));
        self.send_all(snapshot);
    }

    /// Wakes every listener of every repository.
    pub fn notify_all(&self) {
        let snapshot = self.snapshot(None);
        self.send_all(snapshot);
    }

    /// Drops every listener, ending all watch streams.
    pub fn close(&self) {
        self.listeners.lock().clear();
    }

    /// Returns the number of listeners registered for `repository`.
    pub fn listener_count(&self, repository: &str) -> usize {
        self.listeners.lock().get(repository).map_or(0, Vec::len)
    }

    fn snapshot(&self, repository: Option<&str>) -> Vec<(String, u64, mpsc::UnboundedSender<()>)> {
        let listeners = self.listeners.lock();
        listeners
            .iter()
            .filter(|(name, _)| repository.map_or(true, |r| r == name.as_str()))
            .flat_map(|(name, list)| {
                list.iter()
                    .map(move |l| (name.clone(), l.id, l.tx.clone()))
            })
            .collect()
    }

    fn send_all(&self, snapshot: Vec<(String, u64, mpsc::UnboundedSender<()>)>) {
        for (repository, id, tx) in snapshot {
            if tx.send(()).is_err() {
                self.remove(&repository, id);
            }
        }
    }

    fn remove(&self, repository: &str, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(repository) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(repository);
            }
        }
    }
}

/// Unregisters a listener when dropped.
pub struct WatchGuard {
    registry: Weak<WatchRegistry>,
    repository: String,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.repository, self.id);
        }
    }
}
