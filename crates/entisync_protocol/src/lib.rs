//! # EntiSync Protocol
//!
//! Event model and conflict policies for EntiSync.
//!
//! This crate provides:
//! - [`Event`] with its [`SyncStatus`] and [`SyncOperation`]
//! - The storage row shape of events, including legacy key normalization
//! - [`ConflictPolicy`] and [`Resolution`] for divergent local/remote edits
//! - CBOR encoding of event rows
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod event;
mod row;

pub use conflict::{Conflict, ConflictPolicy, ConflictResolver, Resolution};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{Event, SyncOperation, SyncStatus};
pub use row::{
    normalize_row, KEY_CREATED_AT, KEY_DATA_ID, KEY_EVENT_ID, KEY_OPERATION, KEY_PAYLOAD,
    KEY_REPOSITORY, KEY_STATUS,
};
