//! Sync events.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use entisync_codec::Value;
use std::fmt;
use uuid::Uuid;

/// Sync status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Not yet confirmed by the remote.
    Pending,
    /// Confirmed by the remote.
    Ok,
    /// Last push was rejected; the event is offered again next cycle.
    Failed,
}

impl SyncStatus {
    /// Returns the row representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Ok => "ok",
            SyncStatus::Failed => "failed",
        }
    }

    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Ok => 1,
            SyncStatus::Failed => 2,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SyncStatus::Pending),
            1 => Some(SyncStatus::Ok),
            2 => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Parses the row representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(SyncStatus::Pending),
            "ok" | "synced" => Some(SyncStatus::Ok),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if the remote has not confirmed the event yet.
    pub fn is_unconfirmed(&self) -> bool {
        !matches!(self, SyncStatus::Ok)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of state transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOperation {
    /// Record created (never seen by the remote).
    Insert,
    /// Record changed (the remote holds a previous version).
    Update,
    /// Record removed; the event acts as a tombstone.
    Delete,
}

impl SyncOperation {
    /// Returns the row representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Insert => "insert",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }

    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            SyncOperation::Insert => 1,
            SyncOperation::Update => 2,
            SyncOperation::Delete => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SyncOperation::Insert),
            2 => Some(SyncOperation::Update),
            3 => Some(SyncOperation::Delete),
            _ => None,
        }
    }

    /// Parses the row representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Some(SyncOperation::Insert),
            "update" => Some(SyncOperation::Update),
            "delete" => Some(SyncOperation::Delete),
            _ => None,
        }
    }

    /// Returns true if events of this kind carry a payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, SyncOperation::Delete)
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fact describing one state transition of one record.
///
/// Every status change produces a new `Event` through [`Event::with_status`];
/// `created_at` and `operation` never change once an event exists, except
/// through the explicit `with_*` builders the engine uses when it replaces
/// an unconfirmed event.
///
/// # Fields
///
/// - `event_id`: Unique identifier (UUID v4 for locally created events)
/// - `data_id`: Id of the record the event targets
/// - `repository`: Name of the owning repository
/// - `operation`: Insert, Update or Delete
/// - `status`: Pending, Ok or Failed
/// - `created_at`: Creation time (UTC)
/// - `payload`: Record payload for Insert/Update, absent for Delete
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_id: String,
    data_id: String,
    repository: String,
    operation: SyncOperation,
    status: SyncStatus,
    created_at: DateTime<Utc>,
    payload: Option<Value>,
}

impl Event {
    /// Builds an event from its parts, typically one received from a remote.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEvent`] if an id is empty, if an
    /// insert/update carries no map payload, or if a delete carries one.
    pub fn new(
        event_id: impl Into<String>,
        repository: impl Into<String>,
        data_id: impl Into<String>,
        operation: SyncOperation,
        status: SyncStatus,
        created_at: DateTime<Utc>,
        payload: Option<Value>,
    ) -> ProtocolResult<Self> {
        let event = Self {
            event_id: event_id.into(),
            data_id: data_id.into(),
            repository: repository.into(),
            operation,
            status,
            created_at,
            payload,
        };
        event.validate()?;
        Ok(event)
    }

    /// Creates a local insert event.
    pub fn create_insert(
        repository: impl Into<String>,
        data_id: impl Into<String>,
        payload: Value,
        need_sync: bool,
    ) -> Self {
        Self::create(repository, data_id, SyncOperation::Insert, Some(payload), need_sync)
    }

    /// Creates a local update event.
    pub fn create_update(
        repository: impl Into<String>,
        data_id: impl Into<String>,
        payload: Value,
        need_sync: bool,
    ) -> Self {
        Self::create(repository, data_id, SyncOperation::Update, Some(payload), need_sync)
    }

    /// Creates a local delete (tombstone) event.
    pub fn create_delete(
        repository: impl Into<String>,
        data_id: impl Into<String>,
        need_sync: bool,
    ) -> Self {
        Self::create(repository, data_id, SyncOperation::Delete, None, need_sync)
    }

    fn create(
        repository: impl Into<String>,
        data_id: impl Into<String>,
        operation: SyncOperation,
        payload: Option<Value>,
        need_sync: bool,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            data_id: data_id.into(),
            repository: repository.into(),
            operation,
            status: if need_sync {
                SyncStatus::Pending
            } else {
                SyncStatus::Ok
            },
            created_at: Utc::now(),
            payload,
        }
    }

    fn validate(&self) -> ProtocolResult<()> {
        if self.event_id.is_empty() {
            return Err(ProtocolError::invalid_event("event id must not be empty"));
        }
        if self.data_id.is_empty() {
            return Err(ProtocolError::invalid_event("data id must not be empty"));
        }
        match (&self.payload, self.operation.has_payload()) {
            (Some(Value::Map(_)), true) | (None, false) => Ok(()),
            (Some(other), true) => Err(ProtocolError::invalid_event(format!(
                "{} payload must be a map, got {}",
                self.operation,
                other.type_name()
            ))),
            (None, true) => Err(ProtocolError::invalid_event(format!(
                "{} event requires a payload",
                self.operation
            ))),
            (Some(_), false) => Err(ProtocolError::invalid_event(
                "delete event must not carry a payload",
            )),
        }
    }

    /// Returns the event id.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Returns the id of the targeted record.
    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    /// Returns the owning repository name.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the operation.
    pub fn operation(&self) -> SyncOperation {
        self.operation
    }

    /// Returns the sync status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Returns the creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the payload (absent for deletes).
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Returns true for delete events.
    pub fn is_delete(&self) -> bool {
        self.operation == SyncOperation::Delete
    }

    /// Returns a copy with a new status.
    #[must_use]
    pub fn with_status(&self, status: SyncStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Returns a copy with a different operation.
    ///
    /// Only insert ↔ update rewrites are meaningful; the payload is kept.
    #[must_use]
    pub fn with_operation(&self, operation: SyncOperation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// Returns a copy with a different creation time.
    #[must_use]
    pub fn with_created_at(&self, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            ..self.clone()
        }
    }

    /// Returns the size of the payload in top-level fields.
    pub fn payload_len(&self) -> usize {
        self.payload
            .as_ref()
            .and_then(Value::as_map)
            .map_or(0, |m| m.len())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} {} [{}]",
            self.repository, self.data_id, self.operation, self.event_id, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload() -> Value {
        Value::map([("id", Value::from("1")), ("name", Value::from("A"))])
    }

    #[test]
    fn status_codes() {
        assert_eq!(SyncStatus::Pending.to_code(), 0);
        assert_eq!(SyncStatus::from_code(1), Some(SyncStatus::Ok));
        assert_eq!(SyncStatus::from_code(9), None);
        assert_eq!(SyncStatus::parse("FAILED"), Some(SyncStatus::Failed));
        assert_eq!(SyncStatus::parse("synced"), Some(SyncStatus::Ok));
        assert!(SyncStatus::Failed.is_unconfirmed());
        assert!(!SyncStatus::Ok.is_unconfirmed());
    }

    #[test]
    fn operation_codes() {
        assert_eq!(SyncOperation::Delete.to_code(), 3);
        assert_eq!(SyncOperation::from_code(2), Some(SyncOperation::Update));
        assert_eq!(SyncOperation::from_code(0), None);
        assert_eq!(SyncOperation::parse("Insert"), Some(SyncOperation::Insert));
        assert!(!SyncOperation::Delete.has_payload());
    }

    #[test]
    fn create_respects_need_sync() {
        let pending = Event::create_insert("notes", "1", payload(), true);
        assert_eq!(pending.status(), SyncStatus::Pending);
        assert_eq!(pending.operation(), SyncOperation::Insert);

        let trusted = Event::create_update("notes", "1", payload(), false);
        assert_eq!(trusted.status(), SyncStatus::Ok);

        let tombstone = Event::create_delete("notes", "1", true);
        assert!(tombstone.is_delete());
        assert!(tombstone.payload().is_none());
    }

    #[test]
    fn local_events_get_unique_ids() {
        let a = Event::create_insert("notes", "1", payload(), true);
        let b = Event::create_insert("notes", "1", payload(), true);
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn with_status_keeps_everything_else() {
        let event = Event::create_insert("notes", "1", payload(), true);
        let confirmed = event.with_status(SyncStatus::Ok);

        assert_eq!(confirmed.status(), SyncStatus::Ok);
        assert_eq!(event.status(), SyncStatus::Pending);
        assert_eq!(confirmed.created_at(), event.created_at());
        assert_eq!(confirmed.operation(), event.operation());
        assert_eq!(confirmed.event_id(), event.event_id());
        assert_eq!(confirmed.payload(), event.payload());
    }

    #[test]
    fn new_rejects_inconsistent_shapes() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let missing_payload = Event::new(
            "e1",
            "notes",
            "1",
            SyncOperation::Update,
            SyncStatus::Ok,
            at,
            None,
        );
        assert!(matches!(missing_payload, Err(ProtocolError::InvalidEvent { .. })));

        let scalar_payload = Event::new(
            "e1",
            "notes",
            "1",
            SyncOperation::Insert,
            SyncStatus::Ok,
            at,
            Some(Value::Integer(3)),
        );
        assert!(scalar_payload.is_err());

        let delete_with_payload = Event::new(
            "e1",
            "notes",
            "1",
            SyncOperation::Delete,
            SyncStatus::Ok,
            at,
            Some(payload()),
        );
        assert!(delete_with_payload.is_err());

        let empty_id = Event::new(
            "",
            "notes",
            "1",
            SyncOperation::Delete,
            SyncStatus::Ok,
            at,
            None,
        );
        assert!(empty_id.is_err());
    }
}
