//! Storage row shape of events.
//!
//! An event row is a `Value::Map` with the canonical keys below. Rows written
//! by older releases used other key names; [`normalize_row`] rewrites them and
//! is the only place those legacy names are known.

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::{Event, SyncOperation, SyncStatus};
use chrono::{DateTime, TimeZone, Utc};
use entisync_codec::{from_cbor, to_cbor, Value};

/// Row key holding the event id.
pub const KEY_EVENT_ID: &str = "eventId";
/// Row key holding the targeted record id.
pub const KEY_DATA_ID: &str = "dataId";
/// Row key holding the repository name.
pub const KEY_REPOSITORY: &str = "repository";
/// Row key holding the operation.
pub const KEY_OPERATION: &str = "operation";
/// Row key holding the sync status.
pub const KEY_STATUS: &str = "status";
/// Row key holding the creation time (RFC 3339).
pub const KEY_CREATED_AT: &str = "createdAt";
/// Row key holding the payload.
pub const KEY_PAYLOAD: &str = "payload";

const LEGACY_KEYS: &[(&str, &[&str])] = &[
    (KEY_EVENT_ID, &["event_id", "eventID", "id"]),
    (KEY_DATA_ID, &["data_id", "entityId", "entity_id", "recordId"]),
    (KEY_REPOSITORY, &["repositoryName", "repository_name", "collection"]),
    (KEY_OPERATION, &["op", "type", "operationType"]),
    (KEY_STATUS, &["syncStatus", "sync_status"]),
    (KEY_CREATED_AT, &["created_at", "timestamp", "createdAtUtc"]),
    (KEY_PAYLOAD, &["data"]),
];

/// Rewrites legacy key names of a stored event row to the canonical ones.
///
/// A canonical key that is already present wins over its legacy aliases.
/// Non-map values are returned unchanged.
pub fn normalize_row(row: Value) -> Value {
    let Value::Map(mut map) = row else {
        return row;
    };

    for (canonical, aliases) in LEGACY_KEYS {
        if map.contains_key(*canonical) {
            continue;
        }
        if let Some(value) = aliases.iter().find_map(|alias| map.remove(*alias)) {
            map.insert((*canonical).to_string(), value);
        }
    }

    Value::Map(map)
}

impl Event {
    /// Serializes the event to its storage row shape.
    pub fn to_row(&self) -> Value {
        let mut pairs = vec![
            (KEY_EVENT_ID, Value::from(self.event_id())),
            (KEY_DATA_ID, Value::from(self.data_id())),
            (KEY_REPOSITORY, Value::from(self.repository())),
            (KEY_OPERATION, Value::from(self.operation().as_str())),
            (KEY_STATUS, Value::from(self.status().as_str())),
            (KEY_CREATED_AT, Value::Text(self.created_at().to_rfc3339())),
        ];

        if let Some(payload) = self.payload() {
            pairs.push((KEY_PAYLOAD, payload.clone()));
        }

        Value::map(pairs)
    }

    /// Deserializes an event from a storage row.
    ///
    /// Legacy key names are normalized first. `repository` may be absent in
    /// rows written by single-repository tables; `fallback_repository` is
    /// used then.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedRow`] if the event id, data id,
    /// status, operation or creation time is missing or unreadable, or if
    /// the payload does not match the operation.
    pub fn from_row(row: &Value, fallback_repository: &str) -> ProtocolResult<Self> {
        let row = normalize_row(row.clone());
        let map = row
            .as_map()
            .ok_or_else(|| ProtocolError::malformed_row("expected map for event row"))?;

        let get_field = |name: &str| map.get(name).filter(|v| !v.is_null());

        let event_id = get_field(KEY_EVENT_ID)
            .and_then(Value::as_text)
            .ok_or_else(|| ProtocolError::malformed_row("missing eventId"))?;

        let data_id = get_field(KEY_DATA_ID)
            .and_then(Value::as_text)
            .ok_or_else(|| ProtocolError::malformed_row("missing dataId"))?;

        let repository = get_field(KEY_REPOSITORY)
            .and_then(Value::as_text)
            .unwrap_or(fallback_repository);

        let status = get_field(KEY_STATUS)
            .ok_or_else(|| ProtocolError::malformed_row("missing status"))
            .and_then(parse_status)?;

        let operation = get_field(KEY_OPERATION)
            .ok_or_else(|| ProtocolError::malformed_row("missing operation"))
            .and_then(parse_operation)?;

        let created_at = get_field(KEY_CREATED_AT)
            .ok_or_else(|| ProtocolError::malformed_row("missing createdAt"))
            .and_then(parse_created_at)?;

        let payload = get_field(KEY_PAYLOAD).cloned();

        Event::new(
            event_id, repository, data_id, operation, status, created_at, payload,
        )
        .map_err(|e| ProtocolError::malformed_row(e.to_string()))
    }

    /// Encodes the row shape to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(to_cbor(&self.to_row())?)
    }

    /// Decodes an event from CBOR bytes produced by [`Event::encode`].
    pub fn decode(bytes: &[u8], fallback_repository: &str) -> ProtocolResult<Self> {
        let row = from_cbor(bytes)?;
        Self::from_row(&row, fallback_repository)
    }
}

fn parse_status(value: &Value) -> ProtocolResult<SyncStatus> {
    let parsed = match value {
        Value::Text(s) => SyncStatus::parse(s),
        Value::Integer(code) => u8::try_from(*code).ok().and_then(SyncStatus::from_code),
        _ => None,
    };
    parsed.ok_or_else(|| ProtocolError::malformed_row(format!("invalid status {value}")))
}

fn parse_operation(value: &Value) -> ProtocolResult<SyncOperation> {
    let parsed = match value {
        Value::Text(s) => SyncOperation::parse(s),
        Value::Integer(code) => u8::try_from(*code).ok().and_then(SyncOperation::from_code),
        _ => None,
    };
    parsed.ok_or_else(|| ProtocolError::malformed_row(format!("invalid operation {value}")))
}

/// Accepts RFC 3339 text or integer milliseconds since the Unix epoch.
fn parse_created_at(value: &Value) -> ProtocolResult<DateTime<Utc>> {
    match value {
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ProtocolError::malformed_row(format!("invalid createdAt: {e}"))),
        Value::Integer(millis) => Utc
            .timestamp_millis_opt(*millis)
            .single()
            .ok_or_else(|| ProtocolError::malformed_row("createdAt out of range")),
        other => Err(ProtocolError::malformed_row(format!(
            "invalid createdAt {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        Event::create_insert(
            "notes",
            "1",
            Value::map([("id", Value::from("1")), ("name", Value::from("A"))]),
            true,
        )
    }

    #[test]
    fn row_uses_canonical_keys() {
        let row = sample().to_row();
        assert_eq!(row.get(KEY_OPERATION), Some(&Value::from("insert")));
        assert_eq!(row.get(KEY_STATUS), Some(&Value::from("pending")));
        assert!(row.get(KEY_PAYLOAD).is_some());

        let tombstone = Event::create_delete("notes", "1", true).to_row();
        assert!(tombstone.get(KEY_PAYLOAD).is_none());
    }

    #[test]
    fn row_roundtrip_preserves_event() {
        let event = sample();
        let decoded = Event::from_row(&event.to_row(), "ignored").unwrap();
        assert_eq!(decoded, event);

        let bytes = event.encode().unwrap();
        assert_eq!(Event::decode(&bytes, "ignored").unwrap(), event);
    }

    #[test]
    fn legacy_keys_are_normalized() {
        let legacy = Value::map([
            ("id", Value::from("e-1")),
            ("entity_id", Value::from("42")),
            ("op", Value::Integer(2)),
            ("sync_status", Value::from("synced")),
            ("timestamp", Value::Integer(1_700_000_000_000)),
            ("data", Value::map([("id", Value::from("42"))])),
        ]);

        let event = Event::from_row(&legacy, "notes").unwrap();
        assert_eq!(event.event_id(), "e-1");
        assert_eq!(event.data_id(), "42");
        assert_eq!(event.repository(), "notes");
        assert_eq!(event.operation(), SyncOperation::Update);
        assert_eq!(event.status(), SyncStatus::Ok);
        assert_eq!(event.created_at().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let row = normalize_row(Value::map([
            ("eventId", Value::from("canonical")),
            ("event_id", Value::from("legacy")),
        ]));
        assert_eq!(row.get(KEY_EVENT_ID), Some(&Value::from("canonical")));
        assert_eq!(row.get("event_id"), Some(&Value::from("legacy")));
    }

    #[test]
    fn missing_metadata_is_malformed() {
        for key in [KEY_EVENT_ID, KEY_STATUS, KEY_OPERATION, KEY_CREATED_AT] {
            let mut row = sample().to_row();
            row.as_map_mut().unwrap().remove(key);
            let result = Event::from_row(&row, "notes");
            assert!(
                matches!(result, Err(ProtocolError::MalformedRow { .. })),
                "row without {key} must be rejected"
            );
        }
    }

    #[test]
    fn unreadable_values_are_malformed() {
        let mut row = sample().to_row();
        row.as_map_mut()
            .unwrap()
            .insert(KEY_CREATED_AT.into(), Value::from("yesterday"));
        assert!(Event::from_row(&row, "notes").is_err());

        let mut row = sample().to_row();
        row.as_map_mut()
            .unwrap()
            .insert(KEY_STATUS.into(), Value::from("maybe"));
        assert!(Event::from_row(&row, "notes").is_err());

        assert!(Event::from_row(&Value::from("not a row"), "notes").is_err());
    }
}
