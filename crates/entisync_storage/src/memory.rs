//! In-memory storage backend.

use crate::backend::{QueryStream, StateRow, Storage, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult, Table};
use crate::meta::MetaValue;
use crate::query::{Query, QueryRow};
use crate::watch::{WatchGuard, WatchRegistry};
use async_trait::async_trait;
use entisync_codec::Value;
use entisync_protocol::{normalize_row, Event, SyncStatus, KEY_EVENT_ID};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

type RowKey = (String, String);

#[derive(Debug)]
struct StoredEvent {
    seq: u64,
    row: Value,
}

#[derive(Debug, Default)]
struct Partition {
    states: BTreeMap<RowKey, StateRow>,
    events: BTreeMap<RowKey, StoredEvent>,
    meta: BTreeMap<String, MetaValue>,
    next_seq: u64,
}

enum Undo {
    State(RowKey, Option<StateRow>),
    Event(RowKey, Option<StoredEvent>),
}

impl Partition {
    fn decode(repository: &str, stored: &StoredEvent) -> Option<Event> {
        match Event::from_row(&stored.row, repository) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(repository = %repository, error = %e, "skipping malformed event row");
                None
            }
        }
    }

    /// Decoded events of a repository in write order.
    fn events_in(&self, repository: &str) -> Vec<Event> {
        let mut stored: Vec<&StoredEvent> = self
            .events
            .iter()
            .filter(|((repo, _), _)| repo == repository)
            .map(|(_, stored)| stored)
            .collect();
        stored.sort_by_key(|s| s.seq);
        stored
            .into_iter()
            .filter_map(|s| Self::decode(repository, s))
            .collect()
    }

    /// Last-written event of every record, keyed by record id.
    fn heads_in(&self, repository: &str) -> BTreeMap<String, Event> {
        let mut heads = BTreeMap::new();
        for event in self.events_in(repository) {
            heads.insert(event.data_id().to_string(), event);
        }
        heads
    }

    fn check_repository(batch_repository: &str, row_repository: &str) -> StorageResult<()> {
        if batch_repository == row_repository {
            Ok(())
        } else {
            Err(StorageError::invalid_write(format!(
                "row of repository {row_repository} in batch for {batch_repository}"
            )))
        }
    }

    fn apply(&mut self, repository: &str, op: WriteOp, undo: &mut Vec<Undo>) -> StorageResult<()> {
        match op {
            WriteOp::PutState(row) => {
                Self::check_repository(repository, &row.repository)?;
                if !row.payload.is_map() {
                    return Err(StorageError::invalid_write(format!(
                        "state payload of {} must be a map",
                        row.id
                    )));
                }
                let key = (row.repository.clone(), row.id.clone());
                let previous = self.states.insert(key.clone(), row);
                undo.push(Undo::State(key, previous));
            }
            WriteOp::DeleteState { id } => {
                let key = (repository.to_string(), id);
                if let Some(previous) = self.states.remove(&key) {
                    undo.push(Undo::State(key, Some(previous)));
                }
            }
            WriteOp::InsertEvent(event) => {
                Self::check_repository(repository, event.repository())?;
                let key = (repository.to_string(), event.event_id().to_string());
                if self.events.contains_key(&key) {
                    return Err(StorageError::duplicate(Table::Event, key.1));
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                self.events.insert(
                    key.clone(),
                    StoredEvent {
                        seq,
                        row: event.to_row(),
                    },
                );
                undo.push(Undo::Event(key, None));
            }
            WriteOp::UpdateEvent(event) => {
                Self::check_repository(repository, event.repository())?;
                let key = (repository.to_string(), event.event_id().to_string());
                let stored = self
                    .events
                    .get_mut(&key)
                    .ok_or_else(|| StorageError::not_found(Table::Event, event.event_id()))?;
                let previous = std::mem::replace(&mut stored.row, event.to_row());
                let seq = stored.seq;
                undo.push(Undo::Event(key, Some(StoredEvent { seq, row: previous })));
            }
            WriteOp::DeleteEvent { event_id } => {
                let key = (repository.to_string(), event_id);
                let previous = self
                    .events
                    .remove(&key)
                    .ok_or_else(|| StorageError::not_found(Table::Event, key.1.clone()))?;
                undo.push(Undo::Event(key, Some(previous)));
            }
        }
        Ok(())
    }

    /// Applies every write or, on the first failure, restores the partition.
    fn apply_all(&mut self, repository: &str, ops: Vec<WriteOp>) -> StorageResult<()> {
        let seq_before = self.next_seq;
        let mut undo = Vec::with_capacity(ops.len());

        let result = ops
            .into_iter()
            .try_for_each(|op| self.apply(repository, op, &mut undo));

        if result.is_err() {
            for entry in undo.into_iter().rev() {
                match entry {
                    Undo::State(key, Some(row)) => {
                        self.states.insert(key, row);
                    }
                    Undo::State(key, None) => {
                        self.states.remove(&key);
                    }
                    Undo::Event(key, Some(stored)) => {
                        self.events.insert(key, stored);
                    }
                    Undo::Event(key, None) => {
                        self.events.remove(&key);
                    }
                }
            }
            self.next_seq = seq_before;
        }

        result
    }

    fn run_query(&self, query: &Query) -> Vec<QueryRow> {
        let repository = query.repository();

        let mut rows: Vec<QueryRow> = self
            .states
            .values()
            .filter(|row| row.repository == repository)
            .map(StateRow::to_query_row)
            .collect();

        if query.includes_deleted() {
            rows.extend(
                self.heads_in(repository)
                    .into_values()
                    .filter(|head| head.is_delete())
                    .filter(|head| {
                        !self
                            .states
                            .contains_key(&(repository.to_string(), head.data_id().to_string()))
                    })
                    .map(|head| QueryRow {
                        id: head.data_id().to_string(),
                        payload: None,
                        last_event_id: head.event_id().to_string(),
                    }),
            );
            rows.sort_by(|a, b| a.id.cmp(&b.id));
        }

        rows.retain(|row| query.matches(&row.visible_payload()));
        if !query.sorts().is_empty() {
            rows.sort_by(|a, b| query.compare(&a.visible_payload(), &b.visible_payload()));
        }

        rows.into_iter()
            .skip(query.offset_value())
            .take(query.limit_value().unwrap_or(usize::MAX))
            .collect()
    }
}

#[derive(Debug)]
struct Inner {
    open: bool,
    namespace: String,
    partitions: HashMap<String, Partition>,
}

impl Inner {
    fn partition(&self) -> StorageResult<&Partition> {
        if !self.open {
            return Err(StorageError::NotOpen);
        }
        self.partitions
            .get(&self.namespace)
            .ok_or(StorageError::NotOpen)
    }

    fn partition_mut(&mut self) -> StorageResult<&mut Partition> {
        if !self.open {
            return Err(StorageError::NotOpen);
        }
        Ok(self.partitions.entry(self.namespace.clone()).or_default())
    }
}

struct WatchState {
    inner: Arc<RwLock<Inner>>,
    query: Query,
    rx: mpsc::UnboundedReceiver<()>,
    _guard: WatchGuard,
    primed: bool,
}

/// An in-memory storage backend.
///
/// This backend keeps every namespace in memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral clients that don't need persistence
/// - Checking other backends against the reference query semantics
///
/// Event rows are kept in their row shape and decoded on read, exactly as a
/// persistent backend would.
///
/// # Thread Safety
///
/// All tables sit behind one `RwLock`; a commit holds the write lock for the
/// whole batch, so readers always see a consistent snapshot.
///
/// # Example
///
/// ```rust
/// use entisync_storage::{MemoryStorage, Query, Storage};
///
/// # tokio_test_block(async {
/// let storage = MemoryStorage::new();
/// storage.init().await.unwrap();
/// assert!(storage.query(&Query::new("notes")).await.unwrap().is_empty());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
    watchers: Arc<WatchRegistry>,
}

impl MemoryStorage {
    /// Creates a closed storage using the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Creates a closed storage using `namespace`.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                open: false,
                namespace: namespace.into(),
                partitions: HashMap::new(),
            })),
            watchers: WatchRegistry::new(),
        }
    }

    /// Stores an event row as-is, bypassing event validation.
    ///
    /// Used to import rows written by older releases and to exercise the
    /// malformed-row path. Rows without an event id get a generated key.
    pub fn insert_raw_event_row(&self, repository: &str, row: Value) -> StorageResult<()> {
        let key_id = normalize_row(row.clone())
            .get(KEY_EVENT_ID)
            .and_then(Value::as_text)
            .map(str::to_string);

        self.write(repository, |partition| {
            let seq = partition.next_seq;
            let key = (
                repository.to_string(),
                key_id.unwrap_or_else(|| format!("raw-{seq}")),
            );
            if partition.events.contains_key(&key) {
                return Err(StorageError::duplicate(Table::Event, key.1));
            }
            partition.next_seq += 1;
            partition.events.insert(key, StoredEvent { seq, row });
            Ok(())
        })
    }

    /// Returns the number of live watch streams on `repository`.
    pub fn watcher_count(&self, repository: &str) -> usize {
        self.watchers.listener_count(repository)
    }

    fn read<R>(&self, f: impl FnOnce(&Partition) -> R) -> StorageResult<R> {
        let inner = self.inner.read();
        Ok(f(inner.partition()?))
    }

    /// Runs a write under the lock, then notifies watchers of `repository`.
    fn write<R>(
        &self,
        repository: &str,
        f: impl FnOnce(&mut Partition) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let result = {
            let mut inner = self.inner.write();
            f(inner.partition_mut()?)?
        };
        self.watchers.notify(repository);
        Ok(result)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryStorage")
            .field("open", &inner.open)
            .field("namespace", &inner.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if inner.open {
            return Ok(());
        }
        inner.open = true;
        let namespace = inner.namespace.clone();
        inner.partitions.entry(namespace.clone()).or_default();
        info!(namespace = %namespace, "memory storage opened");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.watchers.close();
        let mut inner = self.inner.write();
        if inner.open {
            inner.open = false;
            inner.partitions.clear();
            info!(namespace = %inner.namespace, "memory storage closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.read().open
    }

    async fn get_state(&self, repository: &str, id: &str) -> StorageResult<Option<StateRow>> {
        self.read(|p| {
            p.states
                .get(&(repository.to_string(), id.to_string()))
                .cloned()
        })
    }

    async fn insert_state(&self, row: StateRow) -> StorageResult<()> {
        let repository = row.repository.clone();
        self.write(&repository, |p| {
            if p.states.contains_key(&(row.repository.clone(), row.id.clone())) {
                return Err(StorageError::duplicate(Table::State, row.id));
            }
            p.apply_all(&repository, vec![WriteOp::PutState(row)])
        })
    }

    async fn update_state(&self, row: StateRow) -> StorageResult<()> {
        let repository = row.repository.clone();
        self.write(&repository, |p| {
            if !p.states.contains_key(&(row.repository.clone(), row.id.clone())) {
                return Err(StorageError::not_found(Table::State, row.id));
            }
            p.apply_all(&repository, vec![WriteOp::PutState(row)])
        })
    }

    async fn delete_state(&self, repository: &str, id: &str) -> StorageResult<bool> {
        self.write(repository, |p| {
            Ok(p
                .states
                .remove(&(repository.to_string(), id.to_string()))
                .is_some())
        })
    }

    async fn contains_id(&self, repository: &str, id: &str) -> StorageResult<bool> {
        self.read(|p| {
            p.states
                .contains_key(&(repository.to_string(), id.to_string()))
        })
    }

    async fn all_states(&self, repository: &str) -> StorageResult<Vec<StateRow>> {
        self.read(|p| {
            p.states
                .values()
                .filter(|row| row.repository == repository)
                .cloned()
                .collect()
        })
    }

    async fn get_event(&self, repository: &str, event_id: &str) -> StorageResult<Option<Event>> {
        self.read(|p| {
            p.events
                .get(&(repository.to_string(), event_id.to_string()))
                .and_then(|stored| Partition::decode(repository, stored))
        })
    }

    async fn insert_event(&self, event: Event) -> StorageResult<()> {
        let repository = event.repository().to_string();
        self.write(&repository, |p| {
            p.apply_all(&repository, vec![WriteOp::InsertEvent(event)])
        })
    }

    async fn update_event(&self, event: Event) -> StorageResult<()> {
        let repository = event.repository().to_string();
        self.write(&repository, |p| {
            p.apply_all(&repository, vec![WriteOp::UpdateEvent(event)])
        })
    }

    async fn delete_event(&self, repository: &str, event_id: &str) -> StorageResult<bool> {
        self.write(repository, |p| {
            Ok(p
                .events
                .remove(&(repository.to_string(), event_id.to_string()))
                .is_some())
        })
    }

    async fn events_for(&self, repository: &str, data_id: &str) -> StorageResult<Vec<Event>> {
        self.read(|p| {
            p.events_in(repository)
                .into_iter()
                .filter(|e| e.data_id() == data_id)
                .collect()
        })
    }

    async fn events_with_status(
        &self,
        repository: &str,
        statuses: &[SyncStatus],
    ) -> StorageResult<Vec<Event>> {
        self.read(|p| {
            p.events_in(repository)
                .into_iter()
                .filter(|e| statuses.contains(&e.status()))
                .collect()
        })
    }

    async fn head_events(&self, repository: &str) -> StorageResult<Vec<Event>> {
        self.read(|p| p.heads_in(repository).into_values().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let repository = batch.repository().to_string();
        let writes = batch.len();
        self.write(&repository, |p| p.apply_all(&repository, batch.into_ops()))?;
        debug!(repository = %repository, writes, "committed write batch");
        Ok(())
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        if query.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        self.read(|p| p.run_query(query))
    }

    fn watch_query(&self, query: Query) -> QueryStream {
        if !self.is_open() {
            return stream::once(async { Err(StorageError::NotOpen) }).boxed();
        }

        let (guard, rx) = self.watchers.subscribe(query.repository());
        let state = WatchState {
            inner: Arc::clone(&self.inner),
            query,
            rx,
            _guard: guard,
            primed: false,
        };

        stream::unfold(Some(state), |state| async move {
            let Some(mut state) = state else {
                return None;
            };
            if state.primed {
                if state.rx.recv().await.is_none() {
                    return None;
                }
                // coalesce bursts into one re-evaluation
                while state.rx.try_recv().is_ok() {}
            }
            state.primed = true;

            let result = {
                let inner = state.inner.read();
                // a wake-up queued before close completes the stream
                if !inner.open {
                    return None;
                }
                if state.query.is_unsatisfiable() {
                    Ok(Vec::new())
                } else {
                    inner.partition().map(|p| p.run_query(&state.query))
                }
            };
            let next = result.is_ok().then_some(state);
            Some((result, next))
        })
        .boxed()
    }

    fn namespace(&self) -> String {
        self.inner.read().namespace.clone()
    }

    async fn switch_namespace(&self, namespace: &str) -> StorageResult<()> {
        if namespace.is_empty() {
            return Err(StorageError::InvalidNamespace(namespace.to_string()));
        }
        {
            let mut inner = self.inner.write();
            if !inner.open {
                return Err(StorageError::NotOpen);
            }
            inner.namespace = namespace.to_string();
            inner.partitions.entry(namespace.to_string()).or_default();
        }
        info!(namespace = %namespace, "switched namespace");
        self.watchers.notify_all();
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> StorageResult<Option<MetaValue>> {
        self.read(|p| p.meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: MetaValue) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner.partition_mut()?.meta.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_meta(&self, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write();
        Ok(inner.partition_mut()?.meta.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Sort};
    use entisync_protocol::SyncOperation;

    fn payload(id: &str, name: &str) -> Value {
        Value::map([("id", Value::from(id)), ("name", Value::from(name))])
    }

    fn state(id: &str, name: &str, event_id: &str) -> StateRow {
        StateRow {
            repository: "notes".into(),
            id: id.into(),
            payload: payload(id, name),
            last_event_id: event_id.into(),
        }
    }

    async fn open() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.init().await.unwrap();
        storage
    }

    async fn put(storage: &MemoryStorage, id: &str, name: &str) -> Event {
        let event = Event::create_insert("notes", id, payload(id, name), true);
        let batch = WriteBatch::new("notes")
            .put_state(StateRow::from_event(&event).unwrap())
            .insert_event(event.clone());
        storage.commit(batch).await.unwrap();
        event
    }

    #[tokio::test]
    async fn operations_fail_before_init_and_after_close() {
        let storage = MemoryStorage::new();
        assert!(!storage.is_open());
        assert!(matches!(
            storage.get_state("notes", "1").await,
            Err(StorageError::NotOpen)
        ));

        storage.init().await.unwrap();
        put(&storage, "1", "A").await;
        storage.close().await.unwrap();

        assert!(matches!(
            storage.query(&Query::new("notes")).await,
            Err(StorageError::NotOpen)
        ));
        assert!(matches!(
            storage.set_meta("k", MetaValue::Int(1)).await,
            Err(StorageError::NotOpen)
        ));

        // reopening starts empty
        storage.init().await.unwrap();
        assert!(storage.all_states("notes").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn key_uniqueness() {
        let storage = open().await;
        storage.insert_state(state("1", "A", "e1")).await.unwrap();

        assert!(matches!(
            storage.insert_state(state("1", "B", "e2")).await,
            Err(StorageError::DuplicateKey { table: Table::State, .. })
        ));
        assert!(matches!(
            storage.update_state(state("2", "B", "e2")).await,
            Err(StorageError::NotFound { table: Table::State, .. })
        ));

        let event = Event::create_insert("notes", "1", payload("1", "A"), true);
        storage.insert_event(event.clone()).await.unwrap();
        assert!(matches!(
            storage.insert_event(event).await,
            Err(StorageError::DuplicateKey { table: Table::Event, .. })
        ));

        let missing = Event::create_update("notes", "9", payload("9", "Z"), true);
        assert!(matches!(
            storage.update_event(missing).await,
            Err(StorageError::NotFound { table: Table::Event, .. })
        ));
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_trace() {
        let storage = open().await;
        let existing = put(&storage, "1", "A").await;

        let fresh = Event::create_update("notes", "1", payload("1", "B"), true);
        let batch = WriteBatch::new("notes")
            .put_state(StateRow::from_event(&fresh).unwrap())
            .insert_event(fresh.clone())
            .delete_event("does-not-exist");

        assert!(storage.commit(batch).await.is_err());

        let row = storage.get_state("notes", "1").await.unwrap().unwrap();
        assert_eq!(row.last_event_id, existing.event_id());
        assert!(storage.get_event("notes", fresh.event_id()).await.unwrap().is_none());
        assert_eq!(storage.events_for("notes", "1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_rejects_foreign_rows() {
        let storage = open().await;
        let event = Event::create_insert("tasks", "1", payload("1", "A"), true);
        let batch = WriteBatch::new("notes").insert_event(event);
        assert!(matches!(
            storage.commit(batch).await,
            Err(StorageError::InvalidWrite(_))
        ));
    }

    #[tokio::test]
    async fn events_are_returned_in_write_order() {
        let storage = open().await;
        let first = put(&storage, "1", "A").await;
        let second = Event::create_update("notes", "1", payload("1", "B"), true)
            .with_created_at(first.created_at() - chrono::Duration::seconds(10));
        storage.insert_event(second.clone()).await.unwrap();

        let confirmed = first.with_status(SyncStatus::Ok);
        storage.update_event(confirmed).await.unwrap();

        let events = storage.events_for("notes", "1").await.unwrap();
        let ids: Vec<&str> = events.iter().map(Event::event_id).collect();
        assert_eq!(ids, [first.event_id(), second.event_id()]);
        assert_eq!(events[0].status(), SyncStatus::Ok);

        let pending = storage
            .events_with_status("notes", &[SyncStatus::Pending, SyncStatus::Failed])
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id(), second.event_id());
    }

    #[tokio::test]
    async fn head_events_pick_last_write_per_record() {
        let storage = open().await;
        let a = put(&storage, "a", "A").await;
        put(&storage, "b", "B").await;
        // older timestamp, written later
        let b2 = Event::create_update("notes", "b", payload("b", "B2"), true)
            .with_created_at(a.created_at() - chrono::Duration::seconds(10));
        storage.insert_event(b2.clone()).await.unwrap();
        storage
            .insert_event(Event::create_insert("tasks", "t", payload("t", "T"), true))
            .await
            .unwrap();

        let heads = storage.head_events("notes").await.unwrap();
        let ids: Vec<&str> = heads.iter().map(Event::event_id).collect();
        assert_eq!(ids, [a.event_id(), b2.event_id()]);
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let storage = open().await;
        put(&storage, "1", "A").await;

        storage
            .insert_raw_event_row("notes", Value::map([("dataId", Value::from("1"))]))
            .unwrap();
        storage
            .insert_raw_event_row(
                "notes",
                Value::map([
                    ("event_id", Value::from("legacy-1")),
                    ("entityId", Value::from("2")),
                    ("type", Value::from("update")),
                    ("syncStatus", Value::from("synced")),
                    ("timestamp", Value::Integer(1_700_000_000_000)),
                    ("data", payload("2", "L")),
                ]),
            )
            .unwrap();

        assert_eq!(storage.events_for("notes", "1").await.unwrap().len(), 1);

        let legacy = storage.get_event("notes", "legacy-1").await.unwrap().unwrap();
        assert_eq!(legacy.operation(), SyncOperation::Update);
        assert_eq!(legacy.status(), SyncStatus::Ok);
    }

    #[tokio::test]
    async fn query_with_tombstones() {
        let storage = open().await;
        put(&storage, "a", "A").await;
        put(&storage, "b", "B").await;

        let delete = Event::create_delete("notes", "b", true);
        let batch = WriteBatch::new("notes")
            .delete_state("b")
            .insert_event(delete.clone());
        storage.commit(batch).await.unwrap();

        let live = storage.query(&Query::new("notes")).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "a");

        let all = storage
            .query(&Query::new("notes").include_deleted(true))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[1].is_tombstone());
        assert_eq!(all[1].last_event_id, delete.event_id());

        let named = storage
            .query(
                &Query::new("notes")
                    .include_deleted(true)
                    .filter(Filter::is_null("name")),
            )
            .await
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].id, "b");
    }

    #[tokio::test]
    async fn query_sorts_and_pages() {
        let storage = open().await;
        for (id, name) in [("1", "c"), ("2", "a"), ("3", "b")] {
            put(&storage, id, name).await;
        }

        let rows = storage
            .query(&Query::new("notes").sort(Sort::asc("name")).offset(1).limit(5))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["3", "1"]);
    }

    #[tokio::test]
    async fn empty_in_does_not_touch_storage() {
        let storage = MemoryStorage::new();
        let query = Query::new("notes").filter(Filter::in_list("id", Vec::<Value>::new()));
        // not even opened
        assert!(storage.query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let storage = MemoryStorage::with_namespace("alice");
        storage.init().await.unwrap();
        put(&storage, "1", "A").await;
        storage.set_meta("cursor", MetaValue::from("42")).await.unwrap();

        storage.switch_namespace("bob").await.unwrap();
        assert_eq!(storage.namespace(), "bob");
        assert!(storage.all_states("notes").await.unwrap().is_empty());
        assert!(storage.get_meta("cursor").await.unwrap().is_none());

        storage.switch_namespace("alice").await.unwrap();
        assert_eq!(storage.all_states("notes").await.unwrap().len(), 1);
        assert_eq!(
            storage.get_meta("cursor").await.unwrap(),
            Some(MetaValue::Text("42".into()))
        );
        assert!(storage.remove_meta("cursor").await.unwrap());
        assert!(!storage.remove_meta("cursor").await.unwrap());

        assert!(matches!(
            storage.switch_namespace("").await,
            Err(StorageError::InvalidNamespace(_))
        ));
    }

    #[tokio::test]
    async fn watch_emits_snapshot_then_changes() {
        let storage = open().await;
        let mut stream = storage.watch_query(Query::new("notes"));

        assert!(stream.next().await.unwrap().unwrap().is_empty());

        put(&storage, "1", "A").await;
        let rows = stream.next().await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);

        storage.delete_state("notes", "1").await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_ignores_other_repositories() {
        let storage = open().await;
        let mut stream = storage.watch_query(Query::new("tasks"));
        assert!(stream.next().await.unwrap().unwrap().is_empty());

        put(&storage, "1", "A").await;
        storage
            .insert_state(StateRow {
                repository: "tasks".into(),
                id: "t".into(),
                payload: payload("t", "T"),
                last_event_id: "x".into(),
            })
            .await
            .unwrap();

        let rows = stream.next().await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "t");
    }

    #[tokio::test]
    async fn dropping_stream_unregisters() {
        let storage = open().await;
        let stream = storage.watch_query(Query::new("notes"));
        assert_eq!(storage.watcher_count("notes"), 1);
        drop(stream);
        assert_eq!(storage.watcher_count("notes"), 0);
    }

    #[tokio::test]
    async fn close_ends_streams() {
        let storage = open().await;
        let mut stream = storage.watch_query(Query::new("notes"));
        assert!(stream.next().await.is_some());

        storage.close().await.unwrap();
        assert!(stream.next().await.is_none());

        let mut closed = storage.watch_query(Query::new("notes"));
        assert!(matches!(closed.next().await, Some(Err(StorageError::NotOpen))));
        assert!(closed.next().await.is_none());
    }

    #[tokio::test]
    async fn close_with_queued_change_completes_stream() {
        let storage = open().await;
        let mut stream = storage.watch_query(Query::new("notes"));
        assert!(stream.next().await.unwrap().unwrap().is_empty());

        // the insert queues a wake-up that is still unread at close
        put(&storage, "1", "A").await;
        storage.close().await.unwrap();

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn namespace_switch_re_emits() {
        let storage = open().await;
        put(&storage, "1", "A").await;
        let mut stream = storage.watch_query(Query::new("notes"));
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);

        storage.switch_namespace("other").await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }
}
