//! Storage abstraction and implementations for booktrack.
//!
//! This crate provides the observation-store and result-sink ports used by
//! the completion estimator, with a JSON-file reference implementation and
//! an optional SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{ObservationStore, ResultSink, Storage, StorageError, Result};
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
