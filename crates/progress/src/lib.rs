//! Reading Progress Estimation
//!
//! Predicts when a book being read will be finished from its history of
//! (date, page) observations: a least-squares fit over all observations
//! gives the likely day, and the pace between each consecutive pair gives
//! an optimistic/pessimistic range.

#![warn(missing_docs)]

mod error;
pub mod normalize;
pub mod fit;
pub mod range;
pub mod project;
pub mod estimator;
pub mod worksheet;

pub use error::{EstimateError, Result};
pub use normalize::{normalize, page_day_columns};
pub use fit::LineFit;
pub use range::{estimate_range, DayRange};
pub use project::project_date;
pub use estimator::{
    estimate, estimate_offsets, CompletionEstimator, EstimateOutcome, EstimatorConfig,
    OffsetEstimate, Persistence, MIN_OBSERVATIONS,
};
pub use worksheet::{write_blank, worksheet_file_name, Worksheet};

/// Estimator version, reported alongside the tool version.
pub const ESTIMATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
