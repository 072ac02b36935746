//! Error types for storage operations.

use entisync_codec::CodecError;
use entisync_protocol::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Logical table a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Current record state rows.
    State,
    /// Event rows.
    Event,
    /// Metadata entries.
    Meta,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Table::State => "state",
            Table::Event => "event",
            Table::Meta => "meta",
        })
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage was used before `init` or after `close`.
    #[error("storage is not open")]
    NotOpen,

    /// A row with the same key already exists.
    #[error("duplicate key in {table} table: {key}")]
    DuplicateKey {
        /// Table holding the key.
        table: Table,
        /// The conflicting key.
        key: String,
    },

    /// The row to update or delete does not exist.
    #[error("key not found in {table} table: {key}")]
    NotFound {
        /// Table searched.
        table: Table,
        /// The missing key.
        key: String,
    },

    /// A metadata value has an unsupported type.
    #[error("invalid metadata value: {0}")]
    InvalidMetaValue(String),

    /// A write batch references rows of another repository or is otherwise
    /// inconsistent.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// Namespace names must be non-empty.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl StorageError {
    /// Creates a duplicate key error.
    pub fn duplicate(table: Table, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            table,
            key: key.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(table: Table, key: impl Into<String>) -> Self {
        Self::NotFound {
            table,
            key: key.into(),
        }
    }

    /// Creates an invalid write error.
    pub fn invalid_write(message: impl Into<String>) -> Self {
        Self::InvalidWrite(message.into())
    }
}
