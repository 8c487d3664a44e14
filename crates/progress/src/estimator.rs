//! Completion date estimation.
//!
//! Runs the estimate pipeline for a reading record:
//! ```text
//! Fetch → Validate → Normalize → Fit + Range → Project → Persist
//! ```

use booktrack_core::{BookTarget, Date, EstimateResult, Observation, RecordId, Time};
use booktrack_storage::{ObservationStore, ResultSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fit::LineFit;
use crate::normalize::{normalize, page_day_columns};
use crate::project::project_date;
use crate::range::{estimate_range, DayRange};
use crate::{EstimateError, Result};

/// Fewest observations a line can be fitted through.
pub const MIN_OBSERVATIONS: usize = 2;

/// Raw day offsets behind an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetEstimate {
    /// Date every offset is counted from (the first observation's date)
    pub anchor: Date,
    /// Offset from the fit over all observations
    pub likely: i64,
    /// Pairwise extrapolation bounds
    pub range: DayRange,
    /// The fitted line
    pub fit: LineFit,
}

impl OffsetEstimate {
    /// Convert the offsets into calendar dates.
    pub fn project(&self) -> Result<EstimateResult> {
        Ok(EstimateResult {
            likely_date: project_date(self.anchor, self.likely)?,
            earliest_date: project_date(self.anchor, self.range.min)?,
            latest_date: project_date(self.anchor, self.range.max)?,
        })
    }
}

/// Compute day offsets for finishing `target.total_pages`.
pub fn estimate_offsets(observations: &[Observation], target: &BookTarget) -> Result<OffsetEstimate> {
    if observations.len() < MIN_OBSERVATIONS {
        return Err(EstimateError::InsufficientReadingData {
            found: observations.len(),
            required: MIN_OBSERVATIONS,
        });
    }
    if !target.is_usable() {
        return Err(EstimateError::InsufficientBookData);
    }

    let normalized = normalize(observations)?;
    let (pages, days) = page_day_columns(&normalized);

    let fit = LineFit::fit(&pages, &days)?;
    let likely = fit.completion_offset(target.total_pages);
    debug!(
        "Fit {:.6} days/page, intercept {:.4}: likely day {}",
        fit.slope, fit.intercept, likely
    );

    let range = estimate_range(&pages, &days, target.total_pages)?;
    debug!(
        "Pairwise range [{}, {}] from {} pair(s), {} skipped",
        range.min, range.max, range.pairs_used, range.pairs_skipped
    );

    Ok(OffsetEstimate {
        anchor: normalized[0].date,
        likely,
        range,
        fit,
    })
}

/// Estimate completion dates for a date-ascending observation series.
pub fn estimate(observations: &[Observation], target: &BookTarget) -> Result<EstimateResult> {
    estimate_offsets(observations, target)?.project()
}

/// Configuration for the completion estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Observations required before estimating (never below 2)
    pub min_observations: usize,
    /// Whether to write estimates back to the result sink
    pub persist: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
            persist: true,
        }
    }
}

impl EstimatorConfig {
    fn required_observations(&self) -> usize {
        self.min_observations.max(MIN_OBSERVATIONS)
    }
}

/// What happened to the write-back of an estimate.
#[derive(Debug)]
pub enum Persistence {
    /// Written to the result sink
    Saved,
    /// Not attempted (disabled by configuration)
    Skipped,
    /// The sink rejected the write
    Failed(EstimateError),
}

/// A computed estimate and the outcome of persisting it.
#[derive(Debug)]
pub struct EstimateOutcome {
    /// Record estimated
    pub record_id: RecordId,
    /// Completion dates
    pub result: EstimateResult,
    /// Offsets the dates were projected from
    pub offsets: OffsetEstimate,
    /// Book target used
    pub target: BookTarget,
    /// When the estimate was computed
    pub computed_at: Time,
    /// Write-back outcome
    pub persistence: Persistence,
}

impl EstimateOutcome {
    /// The persistence failure, if the write-back failed.
    pub fn persistence_error(&self) -> Option<&EstimateError> {
        match &self.persistence {
            Persistence::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Completion estimator over an observation store and result sink.
pub struct CompletionEstimator<S> {
    store: S,
    config: EstimatorConfig,
}

impl<S: ObservationStore + ResultSink> CompletionEstimator<S> {
    /// Create an estimator.
    pub fn new(store: S, config: EstimatorConfig) -> Self {
        Self { store, config }
    }

    /// Current configuration.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate a record's completion dates and write the result back.
    ///
    /// Validation and computation errors are returned as `Err`. A failed
    /// write-back is reported in [`EstimateOutcome::persistence`] while the
    /// computed dates are still returned.
    pub async fn estimate_record(&self, id: RecordId) -> Result<EstimateOutcome> {
        // 1. Fetch
        let observations = self.store.fetch_observations(id).await?;
        let target = self.store.fetch_book_target(id).await?;

        // 2. Validate
        let required = self.config.required_observations();
        if observations.len() < required {
            return Err(EstimateError::InsufficientReadingData {
                found: observations.len(),
                required,
            });
        }
        let Some(target) = target else {
            return Err(EstimateError::InsufficientBookData);
        };

        // 3. Compute
        let offsets = estimate_offsets(&observations, &target)?;
        let result = offsets.project()?;
        let computed_at = chrono::Utc::now();
        info!(
            "Record {}: likely {} (earliest {}, latest {})",
            id, result.likely_date, result.earliest_date, result.latest_date
        );

        // 4. Persist
        let persistence = if self.config.persist {
            match self.store.persist_estimate(id, &result, computed_at).await {
                Ok(()) => Persistence::Saved,
                Err(e) => {
                    warn!("Estimate for record {} not saved: {}", id, e);
                    Persistence::Failed(EstimateError::PersistenceFailure(e))
                }
            }
        } else {
            debug!("Persistence disabled, estimate for {} not saved", id);
            Persistence::Skipped
        };

        Ok(EstimateOutcome {
            record_id: id,
            result,
            offsets,
            target,
            computed_at,
            persistence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use booktrack_core::DATE_FORMAT;
    use booktrack_storage::StorageError;
    use std::sync::Mutex;

    fn date(s: &str) -> Date {
        Date::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn obs(d: &str, page: u32) -> Observation {
        Observation::new(date(d), page)
    }

    fn reference_series() -> Vec<Observation> {
        vec![
            obs("2022-02-01", 0),
            obs("2022-02-03", 40),
            obs("2022-02-09", 279),
        ]
    }

    fn reference_target() -> BookTarget {
        BookTarget::new(date("2022-02-01"), 1000.0)
    }

    #[test]
    fn test_reference_offsets() {
        let offsets = estimate_offsets(&reference_series(), &reference_target()).unwrap();

        assert_eq!(offsets.anchor, date("2022-02-01"));
        assert_eq!(offsets.likely, 27);
        assert_eq!((offsets.range.min, offsets.range.max), (26, 44));
        assert_eq!(offsets.range.pairs_skipped, 0);
    }

    #[test]
    fn test_reference_dates() {
        let result = estimate(&reference_series(), &reference_target()).unwrap();

        assert_eq!(result.likely_date, date("2022-02-28"));
        assert_eq!(result.earliest_date, date("2022-02-27"));
        assert_eq!(result.latest_date, date("2022-03-17"));
    }

    #[test]
    fn test_deterministic() {
        let first = estimate_offsets(&reference_series(), &reference_target()).unwrap();
        for _ in 0..10 {
            let again = estimate_offsets(&reference_series(), &reference_target()).unwrap();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_likely_may_fall_outside_range() {
        // The last point sits well below the fitted line
        let series = vec![
            obs("2023-01-01", 0),
            obs("2023-01-11", 100),
            obs("2023-01-12", 200),
        ];
        let target = BookTarget::new(date("2023-01-01"), 210.0);

        let offsets = estimate_offsets(&series, &target).unwrap();
        assert_eq!(offsets.likely, 13);
        assert_eq!((offsets.range.min, offsets.range.max), (11, 12));
        assert!(offsets.likely > offsets.range.max);

        let result = offsets.project().unwrap();
        assert!(result.likely_date > result.latest_date);
    }

    #[test]
    fn test_anchor_is_first_observation_not_book_start() {
        let series = vec![obs("2022-02-11", 0), obs("2022-02-13", 40), obs("2022-02-19", 279)];
        let target = BookTarget::new(date("2022-02-01"), 1000.0);

        let result = estimate(&series, &target).unwrap();
        assert_eq!(result.likely_date, date("2022-03-10"));
    }

    #[test]
    fn test_duplicate_page_pair_recovered() {
        let series = vec![
            obs("2022-02-01", 0),
            obs("2022-02-03", 40),
            obs("2022-02-05", 40),
            obs("2022-02-09", 279),
        ];

        let offsets = estimate_offsets(&series, &reference_target()).unwrap();
        assert_eq!(offsets.range.pairs_skipped, 1);
        assert_eq!((offsets.range.min, offsets.range.max), (20, 44));
        assert_eq!(offsets.likely, 26);
    }

    #[test]
    fn test_single_observation_rejected() {
        let err = estimate(&[obs("2022-02-01", 10)], &reference_target()).unwrap_err();
        assert!(matches!(
            err,
            EstimateError::InsufficientReadingData { found: 1, required: 2 }
        ));
    }

    #[test]
    fn test_empty_target_rejected() {
        let target = BookTarget::new(date("2022-02-01"), 0.0);
        let err = estimate(&reference_series(), &target).unwrap_err();
        assert!(matches!(err, EstimateError::InsufficientBookData));
    }

    #[test]
    fn test_no_progress_is_degenerate() {
        let series = vec![obs("2022-02-01", 50), obs("2022-02-02", 50)];
        let err = estimate(&series, &reference_target()).unwrap_err();
        assert!(matches!(err, EstimateError::DegenerateSlope { skipped_pairs: 1 }));
        assert!(err.is_data_error());
    }

    /// In-memory store with a switchable sink.
    struct MockStore {
        observations: Vec<Observation>,
        target: Option<BookTarget>,
        fail_persist: bool,
        persisted: Mutex<Vec<(RecordId, EstimateResult)>>,
    }

    impl MockStore {
        fn new(observations: Vec<Observation>, target: Option<BookTarget>) -> Self {
            Self {
                observations,
                target,
                fail_persist: false,
                persisted: Mutex::new(Vec::new()),
            }
        }

        fn saved(&self) -> usize {
            self.persisted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ObservationStore for MockStore {
        async fn fetch_observations(&self, _id: RecordId) -> booktrack_storage::Result<Vec<Observation>> {
            Ok(self.observations.clone())
        }

        async fn fetch_book_target(&self, _id: RecordId) -> booktrack_storage::Result<Option<BookTarget>> {
            Ok(self.target)
        }
    }

    #[async_trait]
    impl ResultSink for MockStore {
        async fn persist_estimate(
            &self,
            id: RecordId,
            result: &EstimateResult,
            _computed_at: Time,
        ) -> booktrack_storage::Result<()> {
            if self.fail_persist {
                return Err(StorageError::Other("disk full".into()));
            }
            self.persisted.lock().unwrap().push((id, *result));
            Ok(())
        }
    }

    /// Store whose fetches always fail.
    struct BrokenStore;

    #[async_trait]
    impl ObservationStore for BrokenStore {
        async fn fetch_observations(&self, id: RecordId) -> booktrack_storage::Result<Vec<Observation>> {
            Err(StorageError::record_not_found(id))
        }

        async fn fetch_book_target(&self, id: RecordId) -> booktrack_storage::Result<Option<BookTarget>> {
            Err(StorageError::record_not_found(id))
        }
    }

    #[async_trait]
    impl ResultSink for BrokenStore {
        async fn persist_estimate(
            &self,
            _id: RecordId,
            _result: &EstimateResult,
            _computed_at: Time,
        ) -> booktrack_storage::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_estimate_record_persists() {
        let store = MockStore::new(reference_series(), Some(reference_target()));
        let estimator = CompletionEstimator::new(&store, EstimatorConfig::default());

        let id = RecordId::new();
        let outcome = estimator.estimate_record(id).await.unwrap();

        assert_eq!(outcome.record_id, id);
        assert_eq!(outcome.result.likely_date, date("2022-02-28"));
        assert!(matches!(outcome.persistence, Persistence::Saved));
        assert_eq!(store.saved(), 1);
        assert_eq!(store.persisted.lock().unwrap()[0], (id, outcome.result));
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_result() {
        let mut store = MockStore::new(reference_series(), Some(reference_target()));
        store.fail_persist = true;
        let estimator = CompletionEstimator::new(&store, EstimatorConfig::default());

        let outcome = estimator.estimate_record(RecordId::new()).await.unwrap();

        assert_eq!(outcome.result.latest_date, date("2022-03-17"));
        assert!(matches!(
            outcome.persistence_error(),
            Some(EstimateError::PersistenceFailure(_))
        ));
        assert_eq!(store.saved(), 0);
    }

    #[tokio::test]
    async fn test_persist_disabled() {
        let store = MockStore::new(reference_series(), Some(reference_target()));
        let config = EstimatorConfig { persist: false, ..Default::default() };
        let estimator = CompletionEstimator::new(&store, config);

        let outcome = estimator.estimate_record(RecordId::new()).await.unwrap();

        assert!(matches!(outcome.persistence, Persistence::Skipped));
        assert!(outcome.persistence_error().is_none());
        assert_eq!(store.saved(), 0);
    }

    #[tokio::test]
    async fn test_record_without_target() {
        let store = MockStore::new(reference_series(), None);
        let estimator = CompletionEstimator::new(&store, EstimatorConfig::default());

        let err = estimator.estimate_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, EstimateError::InsufficientBookData));
        assert_eq!(store.saved(), 0);
    }

    #[tokio::test]
    async fn test_reading_data_checked_before_book_data() {
        let store = MockStore::new(vec![obs("2022-02-01", 0)], None);
        let estimator = CompletionEstimator::new(&store, EstimatorConfig::default());

        let err = estimator.estimate_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, EstimateError::InsufficientReadingData { found: 1, .. }));
    }

    #[tokio::test]
    async fn test_min_observations_config() {
        let store = MockStore::new(reference_series(), Some(reference_target()));
        let config = EstimatorConfig { min_observations: 4, ..Default::default() };
        let estimator = CompletionEstimator::new(&store, config);

        let err = estimator.estimate_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EstimateError::InsufficientReadingData { found: 3, required: 4 }
        ));

        // Values below two are raised to two
        let config = EstimatorConfig { min_observations: 0, ..Default::default() };
        let store = MockStore::new(vec![obs("2022-02-01", 0)], Some(reference_target()));
        let estimator = CompletionEstimator::new(&store, config);
        assert!(estimator.estimate_record(RecordId::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_storage_error() {
        let estimator = CompletionEstimator::new(BrokenStore, EstimatorConfig::default());

        let err = estimator.estimate_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, EstimateError::Storage(StorageError::NotFound(_))));
        assert!(!err.is_data_error());
    }
}
