//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building, parsing or resolving events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A stored row is missing required event metadata.
    ///
    /// Readers skip such rows; this error is never surfaced to callers of
    /// the repository API.
    #[error("malformed event row: {message}")]
    MalformedRow {
        /// What is missing or invalid.
        message: String,
    },

    /// An event was constructed with an inconsistent shape.
    #[error("invalid event: {message}")]
    InvalidEvent {
        /// Description of the inconsistency.
        message: String,
    },

    /// A conflict resolver failed to produce a payload.
    #[error("conflict resolution failed for {data_id}: {message}")]
    ConflictResolution {
        /// Record whose conflict could not be resolved.
        data_id: String,
        /// Reason reported by the resolver.
        message: String,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] entisync_codec::CodecError),
}

impl ProtocolError {
    /// Creates a malformed row error.
    pub fn malformed_row(message: impl Into<String>) -> Self {
        Self::MalformedRow {
            message: message.into(),
        }
    }

    /// Creates an invalid event error.
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Creates a conflict resolution error.
    pub fn conflict_resolution(data_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConflictResolution {
            data_id: data_id.into(),
            message: message.into(),
        }
    }
}
