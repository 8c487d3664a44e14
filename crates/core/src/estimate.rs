//! Estimation target and result types.

use serde::{Deserialize, Serialize};
use crate::{Date, Time, DATE_FORMAT};

/// Book metadata an estimate is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookTarget {
    /// Day reading started
    pub start_date: Date,

    /// Last readable page of the book
    pub total_pages: f64,
}

impl BookTarget {
    /// Create a target.
    pub fn new(start_date: Date, total_pages: f64) -> Self {
        Self { start_date, total_pages }
    }

    /// Whether the page count can be estimated against.
    pub fn is_usable(&self) -> bool {
        self.total_pages.is_finite() && self.total_pages > 0.0
    }
}

/// Predicted completion dates.
///
/// The range is derived independently of the likely date, so
/// `earliest_date <= likely_date <= latest_date` does not always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateResult {
    /// Completion date from the fit over all observations
    pub likely_date: Date,

    /// Optimistic completion date
    pub earliest_date: Date,

    /// Pessimistic completion date
    pub latest_date: Date,
}

impl EstimateResult {
    /// Dates as `[likely, earliest, latest]` rendered `YYYY-MM-DD`.
    pub fn as_triple(&self) -> [String; 3] {
        [
            self.likely_date.format(DATE_FORMAT).to_string(),
            self.earliest_date.format(DATE_FORMAT).to_string(),
            self.latest_date.format(DATE_FORMAT).to_string(),
        ]
    }
}

/// An estimate written back to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEstimate {
    /// The computed dates
    pub result: EstimateResult,

    /// When the estimate was computed
    pub computed_at: Time,
}
