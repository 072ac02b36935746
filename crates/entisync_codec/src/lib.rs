//! # EntiSync Codec
//!
//! Dynamic payload values for EntiSync.
//!
//! Records handled by the sync engine are represented as [`Value`] maps
//! while they travel through storage, queries and sync strategies. This
//! crate provides:
//! - The [`Value`] union (null, bool, integer, double, text, array, map)
//! - Query-oriented comparison (`compare`, `loosely_equals`)
//! - `serde_json` interop and serde-based mapping of typed records
//! - Deterministic CBOR encoding for byte-oriented backends
//!
//! ## Usage
//!
//! ```
//! use entisync_codec::{from_cbor, to_cbor, Value};
//!
//! let value = Value::map([("id", Value::from("1")), ("name", Value::from("A"))]);
//! let bytes = to_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use json::{from_value, to_value};
pub use value::Value;
