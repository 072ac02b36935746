//! # EntiSync Core
//!
//! Event-sourced repository engine for local-first applications.
//!
//! This crate provides:
//! - [`Client`], the explicit context that owns a storage and its repositories
//! - [`Repository`] with typed CRUD, queries and live query streams
//! - Per-record sync state tracking through immutable events
//! - Merging of remote events with conflict resolution
//! - The [`SyncStrategy`] contract for pushing events to a remote
//!
//! ## Example
//!
//! ```rust
//! use entisync_core::{Client, ClientConfig, RecordMapper};
//! use entisync_storage::MemoryStorage;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note {
//!     id: String,
//!     title: String,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let client = Client::open(Arc::new(MemoryStorage::new()), ClientConfig::default())
//!     .await
//!     .unwrap();
//! let notes = client.repository("notes", RecordMapper::<Note>::serde()).unwrap();
//!
//! notes
//!     .upsert(&Note { id: "1".into(), title: "hello".into() }, true)
//!     .await
//!     .unwrap();
//! assert_eq!(notes.count().await.unwrap(), 1);
//! assert_eq!(notes.pending_events().await.unwrap().len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod record;
mod repository;
mod strategy;

pub use client::Client;
pub use config::{ClientConfig, RepositoryConfig};
pub use error::{CoreError, CoreResult};
pub use record::RecordMapper;
pub use repository::{MergeOutcome, RecordState, RecordStream, Repository, RowStream, SyncReport};
pub use strategy::{MockStrategy, SyncError, SyncResult, SyncStrategy};

pub use entisync_protocol::{ConflictPolicy, Event, SyncOperation, SyncStatus};
pub use entisync_storage::{Filter, MetaValue, Query, QueryRow, Sort};
