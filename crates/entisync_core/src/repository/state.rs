//! Per-record sync state and engine outcomes.

use chrono::{DateTime, Duration, Utc};
use entisync_protocol::{Event, SyncOperation, SyncStatus};
use std::fmt;

/// Sync state of one record, derived from its head event and state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// No live record and nothing to push.
    Absent,
    /// Created locally; the remote has never seen it.
    PendingInsert,
    /// Changed locally; the remote holds an older version.
    PendingUpdate,
    /// Local and remote agree.
    Synced,
    /// Deleted locally; the tombstone is not confirmed yet.
    PendingDelete,
    /// The last push was rejected; it is retried on the next sync.
    Failed,
}

impl RecordState {
    /// Derives the state from the head event and whether a state row exists.
    pub fn derive(head: Option<&Event>, has_state: bool) -> Self {
        let Some(head) = head else {
            // rows imported without history count as synced
            return if has_state {
                RecordState::Synced
            } else {
                RecordState::Absent
            };
        };

        match (head.status(), head.operation()) {
            (SyncStatus::Failed, _) => RecordState::Failed,
            (SyncStatus::Pending, SyncOperation::Insert) => RecordState::PendingInsert,
            (SyncStatus::Pending, SyncOperation::Update) => RecordState::PendingUpdate,
            (SyncStatus::Pending, SyncOperation::Delete) => RecordState::PendingDelete,
            (SyncStatus::Ok, SyncOperation::Delete) => RecordState::Absent,
            (SyncStatus::Ok, _) => RecordState::Synced,
        }
    }

    /// Returns true if the record has an unconfirmed event.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RecordState::PendingInsert
                | RecordState::PendingUpdate
                | RecordState::PendingDelete
                | RecordState::Failed
        )
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordState::Absent => "absent",
            RecordState::PendingInsert => "pending_insert",
            RecordState::PendingUpdate => "pending_update",
            RecordState::Synced => "synced",
            RecordState::PendingDelete => "pending_delete",
            RecordState::Failed => "failed",
        })
    }
}

/// What [`merge_remote_event`](crate::Repository::merge_remote_event) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeOutcome {
    /// No conflicting local change; the remote event was applied as is.
    Applied,
    /// The remote event is the local head coming back; it is now confirmed.
    Confirmed,
    /// The event id was already stored.
    Duplicate,
    /// Older than the confirmed local head; ignored.
    Stale,
    /// Nothing to do (a delete for a record that does not exist).
    NoOp,
    /// The remote side won a conflict; the local change was dropped.
    AcceptedRemote,
    /// The local side won a conflict and stays pending.
    KeptLocal,
    /// The policy produced a new payload, pending as an update.
    Merged,
    /// A pending local delete outlived a remote edit.
    KeptTombstone,
}

impl MergeOutcome {
    /// Returns true if the conflict policy or delete precedence decided the
    /// outcome.
    pub fn was_conflict(&self) -> bool {
        matches!(
            self,
            MergeOutcome::AcceptedRemote
                | MergeOutcome::KeptLocal
                | MergeOutcome::Merged
                | MergeOutcome::KeptTombstone
        )
    }
}

/// Result of one [`sync`](crate::Repository::sync) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Events offered to the strategies.
    pub attempted: usize,
    /// Events every strategy confirmed.
    pub succeeded: usize,
    /// Events at least one strategy failed or rejected.
    pub failed: usize,
    /// Pending events left for a later call.
    pub remaining: usize,
}

impl SyncReport {
    /// Returns true if nothing is left unconfirmed.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.attempted && self.remaining == 0
    }
}

/// Returns true if the remote is known to hold a version of the record.
///
/// That is the case when the latest confirmed event carries a payload, or
/// when the head is a pending update (the remote's copy was accepted into a
/// conflict resolution without being stored).
pub(crate) fn remote_has_record(events: &[Event]) -> bool {
    let confirmed = events
        .iter()
        .rev()
        .find(|e| e.status() == SyncStatus::Ok)
        .is_some_and(|e| !e.is_delete());

    let pending_update = events.last().is_some_and(|head| {
        head.status().is_unconfirmed() && head.operation() == SyncOperation::Update
    });

    confirmed || pending_update
}

/// Creation time for a new local event: now, but strictly after `after`.
pub(crate) fn next_timestamp(after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match after {
        Some(previous) if previous >= now => previous + Duration::milliseconds(1),
        _ => now,
    }
}
