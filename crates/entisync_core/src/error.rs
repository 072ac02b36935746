//! Error types for EntiSync core.

use entisync_protocol::ProtocolError;
use entisync_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in repository and client operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Event protocol error.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] entisync_codec::CodecError),

    /// Input rejected before anything was written.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// The conflict policy could not produce a payload. Nothing was written.
    #[error("conflict resolution failed for {data_id}: {message}")]
    ConflictResolution {
        /// Record whose conflict was being resolved.
        data_id: String,
        /// Reason reported by the resolver.
        message: String,
    },

    /// The client was closed.
    #[error("client is closed")]
    Closed,
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Returns true for errors caused by caller input. These are never
    /// worth retrying.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::Validation { .. } | CoreError::Storage(StorageError::InvalidMetaValue(_))
        )
    }
}

impl From<ProtocolError> for CoreError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ConflictResolution { data_id, message } => {
                CoreError::ConflictResolution { data_id, message }
            }
            ProtocolError::InvalidEvent { message } => CoreError::Validation { message },
            other => CoreError::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_categories() {
        let err: CoreError = ProtocolError::conflict_resolution("1", "boom").into();
        assert!(matches!(err, CoreError::ConflictResolution { ref data_id, .. } if data_id == "1"));

        let err: CoreError = ProtocolError::invalid_event("bad").into();
        assert!(err.is_validation());

        let err: CoreError = ProtocolError::malformed_row("x").into();
        assert!(matches!(err, CoreError::Protocol(_)));
    }

    #[test]
    fn meta_errors_are_validation() {
        let err = CoreError::from(StorageError::InvalidMetaValue("map".into()));
        assert!(err.is_validation());
        assert!(!CoreError::from(StorageError::NotOpen).is_validation());
    }

    #[test]
    fn error_display() {
        let err = CoreError::validation("missing id field");
        assert_eq!(err.to_string(), "validation failed: missing id field");
    }
}
