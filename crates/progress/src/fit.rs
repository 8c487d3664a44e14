//! Least-squares fit of day offset against page.

use serde::{Deserialize, Serialize};
use crate::{EstimateError, Result};

/// Line `day_offset = slope * page + intercept`.
///
/// Page is the independent variable: the fit answers "on which day is
/// page N reached", not "which page is reached on day N".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Days per page
    pub slope: f64,
    /// Day offset at page zero
    pub intercept: f64,
}

impl LineFit {
    /// Ordinary least squares over parallel page/day columns.
    pub fn fit(pages: &[f64], days: &[f64]) -> Result<Self> {
        debug_assert_eq!(pages.len(), days.len());
        let n = pages.len().min(days.len());
        if n < 2 {
            return Err(EstimateError::InsufficientReadingData { found: n, required: 2 });
        }

        let count = n as f64;
        let mean_x = pages[..n].iter().sum::<f64>() / count;
        let mean_y = days[..n].iter().sum::<f64>() / count;

        let (sxx, sxy) = pages[..n]
            .iter()
            .zip(&days[..n])
            .fold((0.0, 0.0), |(sxx, sxy), (&x, &y)| {
                let dx = x - mean_x;
                (sxx + dx * dx, sxy + dx * (y - mean_y))
            });

        // Every page equal: no consecutive pair has a usable slope either.
        if sxx == 0.0 {
            return Err(EstimateError::DegenerateSlope { skipped_pairs: n - 1 });
        }

        let slope = sxy / sxx;
        Ok(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    /// Fitted day offset at a page.
    pub fn predict(&self, page: f64) -> f64 {
        self.slope * page + self.intercept
    }

    /// Whole day on which `total_pages` is reached, truncated toward zero.
    pub fn completion_offset(&self, total_pages: f64) -> i64 {
        self.predict(total_pages) as i64
    }
}
