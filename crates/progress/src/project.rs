//! Day offsets back to calendar dates.

use booktrack_core::Date;
use chrono::Duration;
use crate::{EstimateError, Result};

/// `start + day_offset` days.
pub fn project_date(start: Date, day_offset: i64) -> Result<Date> {
    Duration::try_days(day_offset)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or(EstimateError::DateOutOfRange { offset: day_offset })
}
