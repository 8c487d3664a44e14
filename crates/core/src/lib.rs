//! booktrack core data models.
//!
//! This crate defines the reading-progress records and the value types
//! exchanged between storage backends and the completion estimator.

#![warn(missing_docs)]

// Identities
mod id;

// Reading progress
mod observation;
mod estimate;
mod record;

// Re-exports
pub use id::*;

pub use observation::{Observation, NormalizedObservation};
pub use estimate::{BookTarget, EstimateResult, StoredEstimate};
pub use record::{ReadingRecord, RecordFilter};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Calendar date type used for observations and estimates
pub type Date = chrono::NaiveDate;

/// Date format used whenever a date is rendered as text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
