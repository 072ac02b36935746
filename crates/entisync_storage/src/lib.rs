//! # EntiSync Storage
//!
//! Storage contract, query model and reference backend for EntiSync.
//!
//! Repositories never talk to a database directly. They read and write
//! through the [`Storage`] trait, which exposes three logical tables per
//! namespace (state rows, event rows and metadata) plus queries and live
//! query streams.
//!
//! ## Design Principles
//!
//! - One [`WriteBatch`] per record mutation, applied atomically
//! - Queries have one meaning, defined by [`evaluate`]
//! - Watch streams re-run their query after every write to the repository
//! - Rows that fail to decode are skipped, never surfaced
//!
//! ## Available Backends
//!
//! - [`MemoryStorage`] - For testing and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use entisync_storage::{Filter, Query, QueryRow, evaluate};
//! use entisync_codec::Value;
//!
//! let rows = vec![QueryRow {
//!     id: "1".into(),
//!     payload: Some(Value::map([("done", Value::Bool(false))])),
//!     last_event_id: "e1".into(),
//! }];
//! let query = Query::new("todos").filter(Filter::equals("done", false));
//! assert_eq!(evaluate(&query, rows).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod evaluator;
mod memory;
mod meta;
mod query;
mod watch;

pub use backend::{QueryStream, StateRow, Storage, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult, Table};
pub use evaluator::evaluate;
pub use memory::{MemoryStorage, DEFAULT_NAMESPACE};
pub use meta::MetaValue;
pub use query::{Filter, FilterOp, Query, QueryRow, Sort};
pub use watch::{WatchGuard, WatchRegistry};
