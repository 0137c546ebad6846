//!
//! Defines the in-memory representation of a database.
//!
//! A database is a JSON object. `Document` wraps that object and provides get, set and
//! delete by path segments, enumeration of every reachable key path, and the shallow
//! merge used by `modify`.

mod document;
pub use document::{Document, shallow_merge};
