//! Optimistic/pessimistic completion range from consecutive-pair slopes.

use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::{EstimateError, Result};

/// Day-offset bounds produced by pairwise extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    /// Smallest extrapolated day offset
    pub min: i64,
    /// Largest extrapolated day offset
    pub max: i64,
    /// Pairs that contributed an estimate
    pub pairs_used: usize,
    /// Pairs skipped because both observations share a page value
    pub pairs_skipped: usize,
}

/// Extrapolate every consecutive pair's pace to `total_pages`.
///
/// Each pair's slope (days per page) is projected from the furthest point
/// reached, `(max(page), max(day))`, and truncated toward zero. Pairs with
/// equal pages are skipped; if none remain the range is undefined.
pub fn estimate_range(pages: &[f64], days: &[f64], total_pages: f64) -> Result<DayRange> {
    debug_assert_eq!(pages.len(), days.len());
    let n = pages.len().min(days.len());
    if n < 2 {
        return Err(EstimateError::InsufficientReadingData { found: n, required: 2 });
    }

    let max_page = pages[..n].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let max_day = days[..n].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let remaining = total_pages - max_page;

    let mut bounds: Option<(i64, i64)> = None;
    let mut used = 0;
    let mut skipped = 0;

    for i in 0..n - 1 {
        let page_delta = pages[i + 1] - pages[i];
        if page_delta == 0.0 {
            warn!(
                "Skipping observations {} and {}: both at page {}",
                i,
                i + 1,
                pages[i]
            );
            skipped += 1;
            continue;
        }

        let slope = (days[i + 1] - days[i]) / page_delta;
        let estimate = (slope * remaining + max_day) as i64;
        used += 1;

        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(estimate), hi.max(estimate)),
            None => (estimate, estimate),
        });
    }

    let (min, max) = bounds.ok_or(EstimateError::DegenerateSlope { skipped_pairs: skipped })?;
    Ok(DayRange {
        min,
        max,
        pairs_used: used,
        pairs_skipped: skipped,
    })
}
