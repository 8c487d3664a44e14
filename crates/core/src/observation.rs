//! Page observations reported while reading.

use serde::{Deserialize, Serialize};
use crate::Date;

/// A single (date, page reached) sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Day the page was reached
    pub date: Date,

    /// Page number reached on that day
    pub page: u32,
}

impl Observation {
    /// Create an observation.
    pub fn new(date: Date, page: u32) -> Self {
        Self { date, page }
    }
}

/// An observation with its whole-day offset from the first sample of its series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedObservation {
    /// Day the page was reached
    pub date: Date,

    /// Page number reached on that day
    pub page: u32,

    /// Days since the first observation of the series
    pub day_offset: i64,
}
