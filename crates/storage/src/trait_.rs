//! Storage trait abstraction.

use async_trait::async_trait;
use booktrack_core::{
    BookTarget, EstimateResult, Observation, ReadingRecord, RecordFilter, RecordId, Time,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data is malformed
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Not-found error for a record.
    pub fn record_not_found(id: RecordId) -> Self {
        Self::NotFound(format!("reading record {}", id))
    }
}

/// Source of reading observations and book targets.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Observations for a record, date ascending.
    async fn fetch_observations(&self, id: RecordId) -> Result<Vec<Observation>>;

    /// Book target for a record, `None` when the page count is unknown.
    async fn fetch_book_target(&self, id: RecordId) -> Result<Option<BookTarget>>;
}

/// Destination for computed estimates.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Write an estimate back against its record.
    async fn persist_estimate(
        &self,
        id: RecordId,
        result: &EstimateResult,
        computed_at: Time,
    ) -> Result<()>;
}

/// Storage abstraction for booktrack data.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait Storage: ObservationStore + ResultSink {
    /// Save a record (create or update).
    async fn save_record(&mut self, record: &ReadingRecord) -> Result<()>;

    /// Load a record by ID.
    async fn load_record(&self, id: RecordId) -> Result<Option<ReadingRecord>>;

    /// List records matching the filter, ordered by start date.
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ReadingRecord>>;

    /// Append an observation to a record and return the updated record.
    async fn add_observation(
        &mut self,
        id: RecordId,
        observation: Observation,
    ) -> Result<ReadingRecord>;

    /// Set the last readable page of a record.
    async fn set_total_pages(&mut self, id: RecordId, pages: f64) -> Result<ReadingRecord>;

    /// Delete a record.
    async fn delete_record(&mut self, id: RecordId) -> Result<()>;
}

#[async_trait]
impl<T: ObservationStore + ?Sized> ObservationStore for &T {
    async fn fetch_observations(&self, id: RecordId) -> Result<Vec<Observation>> {
        (**self).fetch_observations(id).await
    }

    async fn fetch_book_target(&self, id: RecordId) -> Result<Option<BookTarget>> {
        (**self).fetch_book_target(id).await
    }
}

#[async_trait]
impl<T: ResultSink + ?Sized> ResultSink for &T {
    async fn persist_estimate(
        &self,
        id: RecordId,
        result: &EstimateResult,
        computed_at: Time,
    ) -> Result<()> {
        (**self).persist_estimate(id, result, computed_at).await
    }
}
