//! # EntiSync Testkit
//!
//! Test utilities for EntiSync.
//!
//! This crate provides:
//! - A sample record type and in-memory client fixtures
//! - Builders for events as a remote would send them
//! - Scripted and gated sync strategies
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entisync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn upsert_is_pending() {
//!     let fixture = TestClient::memory().await;
//!     let notes = fixture.notes();
//!     notes.upsert(&Note::new("1", "hello"), true).await.unwrap();
//!     assert_eq!(notes.pending_events().await.unwrap().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod strategies;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::strategies::*;
}

pub use fixtures::*;
pub use generators::*;
pub use strategies::*;
