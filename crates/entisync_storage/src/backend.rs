//! Storage contract.

use crate::error::StorageResult;
use crate::meta::MetaValue;
use crate::query::{Query, QueryRow};
use async_trait::async_trait;
use entisync_codec::Value;
use entisync_protocol::{Event, SyncStatus};
use futures::stream::BoxStream;

/// Stream of query results produced by [`Storage::watch_query`].
pub type QueryStream = BoxStream<'static, StorageResult<Vec<QueryRow>>>;

/// Current state of one live record.
///
/// A state row exists iff the latest event for the id is not a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRow {
    /// Owning repository.
    pub repository: String,
    /// Record id.
    pub id: String,
    /// Current payload (always a map).
    pub payload: Value,
    /// Id of the event that produced this state.
    pub last_event_id: String,
}

impl StateRow {
    /// Creates the state row produced by a payload-carrying event.
    pub fn from_event(event: &Event) -> Option<Self> {
        event.payload().map(|payload| Self {
            repository: event.repository().to_string(),
            id: event.data_id().to_string(),
            payload: payload.clone(),
            last_event_id: event.event_id().to_string(),
        })
    }

    /// Converts to a query row.
    pub fn to_query_row(&self) -> QueryRow {
        QueryRow {
            id: self.id.clone(),
            payload: Some(self.payload.clone()),
            last_event_id: self.last_event_id.clone(),
        }
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a state row.
    PutState(StateRow),
    /// Remove a state row if present.
    DeleteState {
        /// Record id.
        id: String,
    },
    /// Insert a new event row; fails if the event id exists.
    InsertEvent(Event),
    /// Replace an existing event row; fails if it does not exist.
    UpdateEvent(Event),
    /// Remove an existing event row; fails if it does not exist.
    DeleteEvent {
        /// Event id.
        event_id: String,
    },
}

/// Writes for one record, applied atomically by [`Storage::commit`].
///
/// All rows must belong to the batch's repository.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    repository: String,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch for `repository`.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ops: Vec::new(),
        }
    }

    /// Adds a state upsert.
    #[must_use]
    pub fn put_state(mut self, row: StateRow) -> Self {
        self.ops.push(WriteOp::PutState(row));
        self
    }

    /// Adds a state removal.
    #[must_use]
    pub fn delete_state(mut self, id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::DeleteState { id: id.into() });
        self
    }

    /// Adds an event insert.
    #[must_use]
    pub fn insert_event(mut self, event: Event) -> Self {
        self.ops.push(WriteOp::InsertEvent(event));
        self
    }

    /// Adds an event replacement.
    #[must_use]
    pub fn update_event(mut self, event: Event) -> Self {
        self.ops.push(WriteOp::UpdateEvent(event));
        self
    }

    /// Adds an event removal.
    #[must_use]
    pub fn delete_event(mut self, event_id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::DeleteEvent {
            event_id: event_id.into(),
        });
        self
    }

    /// Returns the repository name.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the writes in order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch, returning its writes.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Returns true if the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Storage backend used by repositories.
///
/// A backend keeps three logical tables per namespace: state rows keyed by
/// `(repository, id)`, event rows keyed by `(repository, event_id)` and
/// metadata keyed by name. Backends own their row format; repositories only
/// see [`StateRow`], [`Event`] and [`QueryRow`].
///
/// # Invariants
///
/// - Every operation except `init`, `is_open` and `namespace` fails with
///   [`StorageError::NotOpen`](crate::StorageError::NotOpen) before `init`
///   and after `close`
/// - Inserting an existing key fails with `DuplicateKey`; updating a missing
///   key fails with `NotFound`
/// - `events_for` returns events in write order, so the last element is the
///   head event of the record
/// - Event rows that cannot be decoded are skipped with a warning
/// - Every write that touches a repository notifies its watchers once
///
/// # Implementors
///
/// - [`super::MemoryStorage`] - Reference backend for tests and ephemeral use
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens the storage. Opening an open storage is a no-op.
    async fn init(&self) -> StorageResult<()>;

    /// Ends every watch stream, then releases all data.
    async fn close(&self) -> StorageResult<()>;

    /// Returns true between `init` and `close`.
    fn is_open(&self) -> bool;

    /// Reads the state row of a record.
    async fn get_state(&self, repository: &str, id: &str) -> StorageResult<Option<StateRow>>;

    /// Inserts a state row.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the record already has a state row.
    async fn insert_state(&self, row: StateRow) -> StorageResult<()>;

    /// Replaces a state row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record has no state row.
    async fn update_state(&self, row: StateRow) -> StorageResult<()>;

    /// Removes a state row, returning whether it existed.
    async fn delete_state(&self, repository: &str, id: &str) -> StorageResult<bool>;

    /// Returns true if the record has a state row.
    async fn contains_id(&self, repository: &str, id: &str) -> StorageResult<bool>;

    /// Returns every state row of a repository in ascending id order.
    async fn all_states(&self, repository: &str) -> StorageResult<Vec<StateRow>>;

    /// Reads one event.
    async fn get_event(&self, repository: &str, event_id: &str) -> StorageResult<Option<Event>>;

    /// Inserts an event.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the event id is already stored.
    async fn insert_event(&self, event: Event) -> StorageResult<()>;

    /// Replaces an event, keeping its position in write order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event id is not stored.
    async fn update_event(&self, event: Event) -> StorageResult<()>;

    /// Removes an event, returning whether it existed.
    async fn delete_event(&self, repository: &str, event_id: &str) -> StorageResult<bool>;

    /// Returns every event of one record in write order.
    async fn events_for(&self, repository: &str, data_id: &str) -> StorageResult<Vec<Event>>;

    /// Returns every event of a repository with one of `statuses`, in write
    /// order.
    async fn events_with_status(
        &self,
        repository: &str,
        statuses: &[SyncStatus],
    ) -> StorageResult<Vec<Event>>;

    /// Returns the last-written event of every record of a repository, in
    /// ascending record id order.
    async fn head_events(&self, repository: &str) -> StorageResult<Vec<Event>>;

    /// Applies a batch atomically: either every write lands or none does.
    ///
    /// Watchers of the batch's repository are notified once.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Runs a query. The result equals [`crate::evaluate`] over the
    /// repository's rows.
    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>>;

    /// Watches a query.
    ///
    /// The stream yields the current result immediately and again after
    /// every write to the repository. Bursts may coalesce, but the last item
    /// always reflects the final state. Dropping the stream unsubscribes.
    fn watch_query(&self, query: Query) -> QueryStream;

    /// Returns the active namespace.
    fn namespace(&self) -> String;

    /// Switches to another namespace. Every watcher re-emits.
    async fn switch_namespace(&self, namespace: &str) -> StorageResult<()>;

    /// Reads a metadata entry.
    async fn get_meta(&self, key: &str) -> StorageResult<Option<MetaValue>>;

    /// Writes a metadata entry.
    async fn set_meta(&self, key: &str, value: MetaValue) -> StorageResult<()>;

    /// Removes a metadata entry, returning whether it existed.
    async fn remove_meta(&self, key: &str) -> StorageResult<bool>;
}
