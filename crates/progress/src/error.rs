//! Estimation errors.

use booktrack_storage::StorageError;

/// Result type for estimation.
pub type Result<T> = std::result::Result<T, EstimateError>;

/// Errors raised while estimating a completion date.
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    /// Too few observations to fit a line
    #[error("insufficient reading data: {found} observation(s), at least {required} needed")]
    InsufficientReadingData {
        /// Observations supplied
        found: usize,
        /// Observations required
        required: usize,
    },

    /// Book page count missing or unusable
    #[error("insufficient book data: no usable readable page count")]
    InsufficientBookData,

    /// No pair of observations with distinct pages
    #[error("degenerate slope: no observations with distinct pages ({skipped_pairs} pair(s) skipped)")]
    DegenerateSlope {
        /// Consecutive pairs skipped for sharing a page value
        skipped_pairs: usize,
    },

    /// A day offset does not map to a calendar date
    #[error("day offset {offset} is outside the supported calendar range")]
    DateOutOfRange {
        /// The offending offset
        offset: i64,
    },

    /// The estimate was computed but could not be written back
    #[error("failed to persist estimate: {0}")]
    PersistenceFailure(#[source] StorageError),

    /// Observations or book data could not be fetched
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Worksheet could not be read or written
    #[error("worksheet error: {0}")]
    Worksheet(String),
}

impl EstimateError {
    /// Whether the error comes from the input data rather than I/O.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientReadingData { .. }
                | Self::InsufficientBookData
                | Self::DegenerateSlope { .. }
                | Self::DateOutOfRange { .. }
        )
    }
}

impl From<csv::Error> for EstimateError {
    fn from(e: csv::Error) -> Self {
        Self::Worksheet(e.to_string())
    }
}
