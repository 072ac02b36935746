//! Test fixtures and client helpers.
//!
//! Provides a sample record type, an in-memory client with a `notes`
//! repository, and builders for events as a remote would deliver them.

use chrono::{DateTime, Duration, Utc};
use entisync_codec::Value;
use entisync_core::{Client, ClientConfig, RecordMapper, Repository, RepositoryConfig};
use entisync_protocol::{Event, SyncOperation, SyncStatus};
use entisync_storage::MemoryStorage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Repository name used by [`TestClient`].
pub const NOTES: &str = "notes";

/// Sample record used across the test suites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Record id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Completion flag.
    #[serde(default)]
    pub done: bool,
    /// Sort key.
    #[serde(default)]
    pub priority: i64,
}

impl Note {
    /// Creates an open note with priority 0.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            done: false,
            priority: 0,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the note done.
    #[must_use]
    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }

    /// Returns the payload this note is stored as.
    pub fn payload(&self) -> Value {
        entisync_codec::to_value(self).expect("note serializes")
    }
}

/// An in-memory client with a registered `notes` repository.
pub struct TestClient {
    /// The client.
    pub client: Client,
    /// The storage behind the client, for raw inspection.
    pub storage: Arc<MemoryStorage>,
    /// The `notes` repository.
    pub notes: Arc<Repository<Note>>,
}

impl TestClient {
    /// Opens a client on fresh in-memory storage.
    pub async fn memory() -> Self {
        Self::with_config(RepositoryConfig::default()).await
    }

    /// Opens a client whose `notes` repository uses `config`.
    pub async fn with_config(config: RepositoryConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let client = Client::open(storage.clone(), ClientConfig::default())
            .await
            .expect("Failed to open client");
        let notes = client
            .repository_with_config(NOTES, RecordMapper::serde(), config)
            .expect("Failed to register notes");
        Self {
            client,
            storage,
            notes,
        }
    }

    /// Returns the `notes` repository.
    pub fn notes(&self) -> Arc<Repository<Note>> {
        Arc::clone(&self.notes)
    }
}

/// Returns a timestamp `offset_ms` milliseconds from now.
pub fn at(offset_ms: i64) -> DateTime<Utc> {
    Utc::now() + Duration::milliseconds(offset_ms)
}

fn next_remote_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("remote-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Builds a confirmed event of the `notes` repository.
pub fn remote_event(
    operation: SyncOperation,
    data_id: &str,
    payload: Option<Value>,
    created_at: DateTime<Utc>,
) -> Event {
    Event::new(
        next_remote_id(),
        NOTES,
        data_id,
        operation,
        SyncStatus::Ok,
        created_at,
        payload,
    )
    .expect("Invalid remote event")
}

/// A remote insert of `note`.
pub fn remote_insert(note: &Note, created_at: DateTime<Utc>) -> Event {
    remote_event(SyncOperation::Insert, &note.id, Some(note.payload()), created_at)
}

/// A remote update of `note`.
pub fn remote_update(note: &Note, created_at: DateTime<Utc>) -> Event {
    remote_event(SyncOperation::Update, &note.id, Some(note.payload()), created_at)
}

/// A remote delete of `id`.
pub fn remote_delete(id: &str, created_at: DateTime<Utc>) -> Event {
    remote_event(SyncOperation::Delete, id, None, created_at)
}

/// Installs a test-friendly tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client() {
        let fixture = TestClient::memory().await;
        assert_eq!(fixture.client.repository_names(), vec![NOTES.to_string()]);
        assert_eq!(fixture.notes().count().await.unwrap(), 0);
    }

    #[test]
    fn test_note_payload() {
        let payload = Note::new("1", "hello").with_priority(3).payload();
        assert_eq!(payload.get("id"), Some(&Value::from("1")));
        assert_eq!(payload.get("priority"), Some(&Value::Integer(3)));
        assert_eq!(payload.get("done"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_remote_events_are_unique() {
        let note = Note::new("1", "hello");
        let a = remote_insert(&note, at(0));
        let b = remote_insert(&note, at(0));
        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.status(), SyncStatus::Ok);
        assert!(remote_delete("1", at(0)).payload().is_none());
    }
}
