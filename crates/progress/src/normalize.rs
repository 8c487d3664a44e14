//! Day-offset normalization of observation series.

use booktrack_core::{NormalizedObservation, Observation};
use crate::{EstimateError, Result};

/// Attach to each observation its whole-day offset from the first one.
///
/// The input is expected date ascending; ordering is not checked, so an
/// out-of-order series produces negative offsets.
pub fn normalize(observations: &[Observation]) -> Result<Vec<NormalizedObservation>> {
    let first = observations
        .first()
        .ok_or(EstimateError::InsufficientReadingData { found: 0, required: 1 })?;

    Ok(observations
        .iter()
        .map(|o| NormalizedObservation {
            date: o.date,
            page: o.page,
            day_offset: (o.date - first.date).num_days(),
        })
        .collect())
}

/// Split a normalized series into parallel page and day-offset columns.
pub fn page_day_columns(normalized: &[NormalizedObservation]) -> (Vec<f64>, Vec<f64>) {
    normalized
        .iter()
        .map(|n| (f64::from(n.page), n.day_offset as f64))
        .unzip()
}
