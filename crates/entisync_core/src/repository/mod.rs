//! Event-sourced repositories.
//!
//! A repository owns the records of one name. Every mutation writes the new
//! state row and one event in a single storage batch; the event then travels
//! through the registered [`SyncStrategy`] instances until the remote
//! confirms it.

mod merge;
mod state;

pub use state::{MergeOutcome, RecordState, SyncReport};

use crate::config::RepositoryConfig;
use crate::error::{CoreError, CoreResult};
use crate::record::RecordMapper;
use crate::strategy::SyncStrategy;
use entisync_codec::Value;
use entisync_protocol::{Event, SyncOperation, SyncStatus};
use entisync_storage::{Query, QueryRow, StateRow, Storage, WriteBatch};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use state::{next_timestamp, remote_has_record};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Stream of typed query results.
pub type RecordStream<T> = BoxStream<'static, CoreResult<Vec<T>>>;

/// Stream of raw query rows.
pub type RowStream = BoxStream<'static, CoreResult<Vec<QueryRow>>>;

/// Typed access to the records of one repository.
///
/// Repositories are created through [`Client::repository`](crate::Client::repository)
/// and shared as `Arc<Repository<T>>`.
///
/// # Concurrency
///
/// Writes, merges and push-result recording are serialized per repository.
/// Strategy pushes run outside that lock, so a slow remote never blocks
/// local writes.
///
/// # Example
///
/// ```rust,ignore
/// let notes = client.repository("notes", RecordMapper::<Note>::serde())?;
/// notes.add_strategy(Arc::new(my_strategy));
///
/// notes.upsert(&note, true).await?;
/// let open = notes.find(notes.query().filter(Filter::equals("done", false))).await?;
/// ```
pub struct Repository<T> {
    name: String,
    storage: Arc<dyn Storage>,
    mapper: RecordMapper<T>,
    config: RepositoryConfig,
    strategies: RwLock<Vec<Arc<dyn SyncStrategy>>>,
    write_lock: Mutex<()>,
}

impl<T> Repository<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        name: impl Into<String>,
        storage: Arc<dyn Storage>,
        mapper: RecordMapper<T>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            mapper,
            config,
            strategies: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Registers a strategy. Every later push is offered to it.
    pub fn add_strategy(&self, strategy: Arc<dyn SyncStrategy>) {
        debug!(repository = %self.name, strategy = strategy.name(), "strategy added");
        self.strategies.write().push(strategy);
    }

    /// Returns the number of registered strategies.
    pub fn strategy_count(&self) -> usize {
        self.strategies.read().len()
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Inserts or replaces a record.
    ///
    /// With `need_sync` the new event is pending and, if configured, pushed
    /// immediately; push failures are recorded, never returned. Without it
    /// the event is written as already confirmed, which is how data pulled
    /// from a trusted source is stored.
    ///
    /// Returns the written event.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the record does not map to a map payload
    /// or has no usable id field.
    pub async fn upsert(&self, record: &T, need_sync: bool) -> CoreResult<Event> {
        let payload = self.mapper.to_value(record)?;
        let id = self.extract_id(&payload)?;

        let event = {
            let _guard = self.write_lock.lock().await;
            let events = self.storage.events_for(&self.name, &id).await?;
            let head = events.last();
            let unconfirmed = head.filter(|h| h.status().is_unconfirmed());

            // a failed push may still have reached the remote
            let failed = head.is_some_and(|h| h.status() == SyncStatus::Failed);
            let operation = if failed || remote_has_record(&events) {
                SyncOperation::Update
            } else {
                SyncOperation::Insert
            };

            let created_at = match unconfirmed {
                // a pending insert keeps its place in the push order
                Some(h) if need_sync && h.operation() == SyncOperation::Insert
                    && operation == SyncOperation::Insert =>
                {
                    h.created_at()
                }
                _ => next_timestamp(head.map(Event::created_at)),
            };

            let event = match operation {
                SyncOperation::Update => Event::create_update(&self.name, &id, payload, need_sync),
                _ => Event::create_insert(&self.name, &id, payload, need_sync),
            }
            .with_created_at(created_at);

            let mut batch = WriteBatch::new(&self.name);
            if let Some(row) = StateRow::from_event(&event) {
                batch = batch.put_state(row);
            }
            if let Some(superseded) = unconfirmed {
                batch = batch.delete_event(superseded.event_id());
            }
            self.storage.commit(batch.insert_event(event.clone())).await?;

            debug!(
                repository = %self.name,
                id = %id,
                event_id = %event.event_id(),
                operation = %event.operation(),
                status = %event.status(),
                superseded = unconfirmed.is_some(),
                "record upserted"
            );
            event
        };

        if need_sync && self.config.push_on_write {
            self.push_and_log(&event).await;
        }
        Ok(event)
    }

    /// Deletes a record, leaving a tombstone event.
    ///
    /// Returns `None` without writing anything if the record does not exist.
    pub async fn delete(&self, id: &str, need_sync: bool) -> CoreResult<Option<Event>> {
        let event = {
            let _guard = self.write_lock.lock().await;
            if !self.storage.contains_id(&self.name, id).await? {
                debug!(repository = %self.name, id = %id, "delete of absent record ignored");
                return Ok(None);
            }

            let events = self.storage.events_for(&self.name, id).await?;
            let head = events.last();
            let unconfirmed = head.filter(|h| h.status().is_unconfirmed());

            let event = Event::create_delete(&self.name, id, need_sync)
                .with_created_at(next_timestamp(head.map(Event::created_at)));

            let mut batch = WriteBatch::new(&self.name).delete_state(id);
            if let Some(superseded) = unconfirmed {
                batch = batch.delete_event(superseded.event_id());
            }
            self.storage.commit(batch.insert_event(event.clone())).await?;

            debug!(
                repository = %self.name,
                id = %id,
                event_id = %event.event_id(),
                status = %event.status(),
                "record deleted"
            );
            event
        };

        if need_sync && self.config.push_on_write {
            self.push_and_log(&event).await;
        }
        Ok(Some(event))
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Returns a query builder for this repository.
    pub fn query(&self) -> Query {
        Query::new(&self.name)
    }

    /// Runs a query and maps the live rows to records.
    pub async fn find(&self, query: Query) -> CoreResult<Vec<T>> {
        let rows = self.find_rows(query).await?;
        self.decode_rows(&rows)
    }

    /// Runs a query and returns raw rows, tombstones included if requested.
    pub async fn find_rows(&self, query: Query) -> CoreResult<Vec<QueryRow>> {
        self.check_query(&query)?;
        Ok(self.storage.query(&query).await?)
    }

    /// Watches a query, yielding records.
    ///
    /// The stream yields the current result first and again after every
    /// change to the repository. Dropping the stream stops watching.
    pub fn watch(&self, query: Query) -> CoreResult<RecordStream<T>> {
        let mapper = self.mapper.clone();
        let rows = self.watch_rows(query)?;
        Ok(rows
            .map(move |result| {
                result.and_then(|rows| {
                    rows.iter()
                        .filter_map(|row| row.payload.as_ref())
                        .map(|payload| mapper.from_value(payload))
                        .collect::<CoreResult<Vec<T>>>()
                })
            })
            .boxed())
    }

    /// Watches a query, yielding raw rows.
    pub fn watch_rows(&self, query: Query) -> CoreResult<RowStream> {
        self.check_query(&query)?;
        Ok(self
            .storage
            .watch_query(query)
            .map(|result| result.map_err(CoreError::from))
            .boxed())
    }

    /// Returns the record with `id`, if it exists.
    pub async fn get(&self, id: &str) -> CoreResult<Option<T>> {
        self.storage
            .get_state(&self.name, id)
            .await?
            .map(|row| self.mapper.from_value(&row.payload))
            .transpose()
    }

    /// Returns every live record in ascending id order.
    pub async fn get_all(&self) -> CoreResult<Vec<T>> {
        self.storage
            .all_states(&self.name)
            .await?
            .iter()
            .map(|row| self.mapper.from_value(&row.payload))
            .collect()
    }

    /// Returns the number of live records.
    pub async fn count(&self) -> CoreResult<usize> {
        Ok(self.storage.all_states(&self.name).await?.len())
    }

    /// Returns true if a live record with `id` exists.
    pub async fn contains(&self, id: &str) -> CoreResult<bool> {
        Ok(self.storage.contains_id(&self.name, id).await?)
    }

    /// Returns the sync state of a record.
    pub async fn record_state(&self, id: &str) -> CoreResult<RecordState> {
        let events = self.storage.events_for(&self.name, id).await?;
        let has_state = self.storage.contains_id(&self.name, id).await?;
        Ok(RecordState::derive(events.last(), has_state))
    }

    // ---------------------------------------------------------------
    // Sync
    // ---------------------------------------------------------------

    /// Returns the unconfirmed head event of every record, oldest first.
    pub async fn pending_events(&self) -> CoreResult<Vec<Event>> {
        let mut heads: Vec<Event> = self
            .storage
            .head_events(&self.name)
            .await?
            .into_iter()
            .filter(|head| head.status().is_unconfirmed())
            .collect();

        heads.sort_by_key(Event::created_at);
        Ok(heads)
    }

    /// Offers pending events to every strategy and records the results.
    ///
    /// At most `pending_batch_size` events are offered per call.
    pub async fn sync(&self) -> CoreResult<SyncReport> {
        let pending = self.pending_events().await?;
        let mut report = SyncReport {
            remaining: pending.len(),
            ..SyncReport::default()
        };

        if self.strategy_count() == 0 {
            debug!(repository = %self.name, pending = pending.len(), "sync skipped, no strategies");
            return Ok(report);
        }

        for event in pending.iter().take(self.config.pending_batch_size) {
            report.attempted += 1;
            report.remaining -= 1;
            match self.push(event).await? {
                Some(SyncStatus::Ok) => report.succeeded += 1,
                Some(SyncStatus::Failed) => report.failed += 1,
                _ => {}
            }
        }

        debug!(
            repository = %self.name,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = report.remaining,
            "sync finished"
        );
        Ok(report)
    }

    async fn push_and_log(&self, event: &Event) {
        if let Err(e) = self.push(event).await {
            warn!(
                repository = %self.name,
                event_id = %event.event_id(),
                error = %e,
                "could not record push result"
            );
        }
    }

    /// Offers `event` to every strategy and records the combined status.
    ///
    /// Returns `None` when no strategy is registered.
    async fn push(&self, event: &Event) -> CoreResult<Option<SyncStatus>> {
        let strategies: Vec<Arc<dyn SyncStrategy>> = self.strategies.read().clone();
        if strategies.is_empty() {
            return Ok(None);
        }

        let mut combined = SyncStatus::Ok;
        for strategy in &strategies {
            let status = match strategy.push_one(event).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        repository = %self.name,
                        event_id = %event.event_id(),
                        strategy = strategy.name(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "push failed"
                    );
                    SyncStatus::Failed
                }
            };
            combined = match (combined, status) {
                (SyncStatus::Failed, _) | (_, SyncStatus::Failed) => SyncStatus::Failed,
                (SyncStatus::Pending, _) | (_, SyncStatus::Pending) => SyncStatus::Pending,
                _ => SyncStatus::Ok,
            };
        }

        self.record_push_result(event, combined).await?;
        Ok(Some(combined))
    }

    async fn record_push_result(&self, event: &Event, status: SyncStatus) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.storage.get_event(&self.name, event.event_id()).await?;

        match current {
            Some(current) if current.status().is_unconfirmed() => {
                if current.status() != status {
                    self.storage.update_event(current.with_status(status)).await?;
                }
                debug!(
                    repository = %self.name,
                    id = %event.data_id(),
                    event_id = %event.event_id(),
                    status = %status,
                    "push result recorded"
                );
            }
            Some(_) => {}
            None if status == SyncStatus::Ok => {
                // superseded while in flight; the remote now holds the record
                let events = self.storage.events_for(&self.name, event.data_id()).await?;
                if let Some(head) = events.last() {
                    if head.status().is_unconfirmed() && head.operation() == SyncOperation::Insert
                    {
                        self.storage
                            .update_event(head.with_operation(SyncOperation::Update))
                            .await?;
                        debug!(
                            repository = %self.name,
                            id = %event.data_id(),
                            event_id = %head.event_id(),
                            "pending insert promoted to update"
                        );
                    }
                }
            }
            None => {}
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn extract_id(&self, payload: &Value) -> CoreResult<String> {
        let field = &self.config.id_field;
        match payload.get(field) {
            Some(Value::Text(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Integer(id)) => Ok(id.to_string()),
            Some(other) => Err(CoreError::validation(format!(
                "id field {field:?} must be non-empty text or an integer, got {}",
                other.type_name()
            ))),
            None => Err(CoreError::validation(format!(
                "payload of {} has no id field {field:?}",
                self.name
            ))),
        }
    }

    fn check_query(&self, query: &Query) -> CoreResult<()> {
        if query.repository() != self.name {
            return Err(CoreError::validation(format!(
                "query for {} sent to repository {}",
                query.repository(),
                self.name
            )));
        }
        Ok(())
    }

    fn decode_rows(&self, rows: &[QueryRow]) -> CoreResult<Vec<T>> {
        rows.iter()
            .filter_map(|row| row.payload.as_ref())
            .map(|payload| self.mapper.from_value(payload))
            .collect()
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("strategies", &self.strategies.read().len())
            .finish_non_exhaustive()
    }
}
