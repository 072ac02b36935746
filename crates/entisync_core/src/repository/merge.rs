//! Applying remote events.

use super::state::{next_timestamp, MergeOutcome};
use super::Repository;
use crate::error::{CoreError, CoreResult};
use entisync_protocol::{Conflict, Event, Resolution, SyncOperation, SyncStatus};
use entisync_storage::{StateRow, WriteBatch};
use tracing::{debug, warn};

impl<T> Repository<T>
where
    T: Send + Sync + 'static,
{
    /// Applies one event received from a remote.
    ///
    /// Re-applying an event id that is already stored never changes state.
    /// If the record has an unconfirmed local event, the conflict is decided
    /// here: a remote delete always wins, a local delete outlives a remote
    /// edit, and anything else goes through the configured
    /// [`ConflictPolicy`](entisync_protocol::ConflictPolicy), invoked once.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the event belongs to another repository,
    /// and [`CoreError::ConflictResolution`] if the policy fails. In both
    /// cases nothing is written.
    pub async fn merge_remote_event(&self, remote: Event) -> CoreResult<MergeOutcome> {
        if remote.repository() != self.name {
            return Err(CoreError::validation(format!(
                "event {} of repository {} merged into {}",
                remote.event_id(),
                remote.repository(),
                self.name
            )));
        }

        let _guard = self.write_lock.lock().await;
        let events = self.storage.events_for(&self.name, remote.data_id()).await?;
        let head = events.last();

        let outcome = if events.iter().any(|e| e.event_id() == remote.event_id()) {
            match head {
                Some(h) if h.event_id() == remote.event_id() && h.status().is_unconfirmed() => {
                    self.storage.update_event(h.with_status(SyncStatus::Ok)).await?;
                    MergeOutcome::Confirmed
                }
                _ => MergeOutcome::Duplicate,
            }
        } else {
            match head {
                None => self.apply_remote(&remote).await?,
                Some(h) if h.status() == SyncStatus::Ok => {
                    if remote.created_at() < h.created_at() {
                        warn!(
                            repository = %self.name,
                            id = %remote.data_id(),
                            event_id = %remote.event_id(),
                            head_event_id = %h.event_id(),
                            "stale remote event ignored"
                        );
                        MergeOutcome::Stale
                    } else {
                        self.apply_remote(&remote).await?
                    }
                }
                Some(local) => self.resolve_conflict(&events, local, &remote).await?,
            }
        };

        debug!(
            repository = %self.name,
            id = %remote.data_id(),
            event_id = %remote.event_id(),
            operation = %remote.operation(),
            outcome = ?outcome,
            "remote event merged"
        );
        Ok(outcome)
    }

    /// Applies remote events in order, stopping at the first error.
    pub async fn merge_remote_events(
        &self,
        events: impl IntoIterator<Item = Event>,
    ) -> CoreResult<Vec<MergeOutcome>> {
        let mut outcomes = Vec::new();
        for event in events {
            outcomes.push(self.merge_remote_event(event).await?);
        }
        Ok(outcomes)
    }

    /// Stores a remote event that meets no unconfirmed local change.
    async fn apply_remote(&self, remote: &Event) -> CoreResult<MergeOutcome> {
        let confirmed = remote.with_status(SyncStatus::Ok);
        let batch = WriteBatch::new(&self.name);

        let batch = match StateRow::from_event(&confirmed) {
            Some(row) => batch.put_state(row),
            None => {
                if !self.storage.contains_id(&self.name, remote.data_id()).await? {
                    return Ok(MergeOutcome::NoOp);
                }
                batch.delete_state(remote.data_id())
            }
        };

        self.storage.commit(batch.insert_event(confirmed)).await?;
        Ok(MergeOutcome::Applied)
    }

    async fn resolve_conflict(
        &self,
        events: &[Event],
        local: &Event,
        remote: &Event,
    ) -> CoreResult<MergeOutcome> {
        let confirmed_remote = remote.with_status(SyncStatus::Ok);
        let data_id = remote.data_id();

        if remote.is_delete() {
            let batch = WriteBatch::new(&self.name)
                .delete_state(data_id)
                .delete_event(local.event_id())
                .insert_event(confirmed_remote);
            self.storage.commit(batch).await?;
            return Ok(MergeOutcome::AcceptedRemote);
        }

        if local.is_delete() {
            // The remote copy is recorded below the tombstone so replays
            // are recognized; the tombstone stays the head.
            let mut batch = WriteBatch::new(&self.name);
            for prior in &events[..events.len().saturating_sub(1)] {
                if prior.status().is_unconfirmed() {
                    batch = batch.update_event(prior.with_status(SyncStatus::Ok));
                }
            }
            let batch = batch
                .delete_event(local.event_id())
                .insert_event(confirmed_remote)
                .insert_event(local.clone());
            self.storage.commit(batch).await?;
            return Ok(MergeOutcome::KeptTombstone);
        }

        let conflict = Conflict::new(local, remote);
        let resolved = self.config.conflict_policy.resolve(&conflict)?;

        debug!(
            repository = %self.name,
            id = %data_id,
            local_event_id = %local.event_id(),
            remote_event_id = %remote.event_id(),
            policy = self.config.conflict_policy.name(),
            "conflict resolved"
        );

        match Resolution::classify(&conflict, resolved) {
            Resolution::AcceptRemote => {
                let state = StateRow::from_event(&confirmed_remote)
                    .ok_or_else(|| CoreError::conflict_resolution(data_id, "remote payload missing"))?;
                let batch = WriteBatch::new(&self.name)
                    .put_state(state)
                    .delete_event(local.event_id())
                    .insert_event(confirmed_remote);
                self.storage.commit(batch).await?;
                Ok(MergeOutcome::AcceptedRemote)
            }
            Resolution::KeepLocal => {
                let kept = local.with_operation(SyncOperation::Update);
                let batch = WriteBatch::new(&self.name)
                    .delete_event(local.event_id())
                    .insert_event(confirmed_remote)
                    .insert_event(kept);
                self.storage.commit(batch).await?;
                Ok(MergeOutcome::KeptLocal)
            }
            Resolution::Merged(payload) => {
                let merged_id = self
                    .extract_id(&payload)
                    .map_err(|e| CoreError::conflict_resolution(data_id, e.to_string()))?;
                if merged_id != data_id {
                    return Err(CoreError::conflict_resolution(
                        data_id,
                        format!("merged payload has id {merged_id}"),
                    ));
                }
                let latest = local.created_at().max(remote.created_at());
                let merged = Event::create_update(&self.name, data_id, payload, true)
                    .with_created_at(next_timestamp(Some(latest)));
                let state = StateRow::from_event(&merged)
                    .ok_or_else(|| CoreError::conflict_resolution(data_id, "merged payload missing"))?;
                let batch = WriteBatch::new(&self.name)
                    .put_state(state)
                    .delete_event(local.event_id())
                    .insert_event(confirmed_remote)
                    .insert_event(merged);
                self.storage.commit(batch).await?;
                Ok(MergeOutcome::Merged)
            }
        }
    }
}
