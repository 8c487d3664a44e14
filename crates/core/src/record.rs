//! Reading record model - one reading of one book.

use serde::{Deserialize, Serialize};
use crate::id::RecordId;
use crate::{BookTarget, Date, Observation, StoredEstimate, Time};

/// A reading record tracks progress through a book from a start date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    /// Unique identifier
    pub id: RecordId,

    /// Book title
    pub title: String,

    /// Book author
    #[serde(default)]
    pub author: Option<String>,

    /// Day reading started
    pub start_date: Date,

    /// Last readable page, if known
    #[serde(default)]
    pub total_pages: Option<f64>,

    /// Page observations, date ascending
    #[serde(default)]
    pub observations: Vec<Observation>,

    /// Estimates computed so far, oldest first
    #[serde(default)]
    pub estimates: Vec<StoredEstimate>,

    /// When created
    pub created_at: Time,
}

impl ReadingRecord {
    /// Create a new record with no observations.
    pub fn new(title: impl Into<String>, start_date: Date) -> Self {
        Self {
            id: RecordId::new(),
            title: title.into(),
            author: None,
            start_date,
            total_pages: None,
            observations: Vec::new(),
            estimates: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the last readable page.
    pub fn with_total_pages(mut self, pages: f64) -> Self {
        self.total_pages = Some(pages);
        self
    }

    /// Estimation target, present only when the page count is usable.
    pub fn book_target(&self) -> Option<BookTarget> {
        let target = BookTarget::new(self.start_date, self.total_pages?);
        target.is_usable().then_some(target)
    }

    /// Insert an observation keeping date order.
    ///
    /// Entries sharing a date keep their arrival order.
    pub fn add_observation(&mut self, observation: Observation) {
        let at = self
            .observations
            .partition_point(|o| o.date <= observation.date);
        self.observations.insert(at, observation);
    }

    /// Most recent stored estimate.
    pub fn latest_estimate(&self) -> Option<&StoredEstimate> {
        self.estimates.last()
    }

    /// Highest page observed so far.
    pub fn current_page(&self) -> Option<u32> {
        self.observations.iter().map(|o| o.page).max()
    }
}

/// Filter for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Case-insensitive title substring
    pub title: Option<String>,
}

impl RecordFilter {
    /// Whether a record passes the filter.
    pub fn matches(&self, record: &ReadingRecord) -> bool {
        match &self.title {
            Some(needle) => record
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DATE_FORMAT;

    fn date(s: &str) -> Date {
        Date::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_observations_stay_date_ordered() {
        let mut record = ReadingRecord::new("Command and Control", date("2022-02-01"));
        record.add_observation(Observation::new(date("2022-02-09"), 279));
        record.add_observation(Observation::new(date("2022-02-01"), 0));
        record.add_observation(Observation::new(date("2022-02-03"), 40));
        record.add_observation(Observation::new(date("2022-02-03"), 55));

        let pages: Vec<u32> = record.observations.iter().map(|o| o.page).collect();
        assert_eq!(pages, vec![0, 40, 55, 279]);
        assert_eq!(record.current_page(), Some(279));
    }

    #[test]
    fn test_book_target_requires_pages() {
        let record = ReadingRecord::new("Untitled", date("2022-02-01"));
        assert!(record.book_target().is_none());

        let record = record.with_total_pages(0.0);
        assert!(record.book_target().is_none());

        let record = record.with_total_pages(412.0);
        let target = record.book_target().unwrap();
        assert_eq!(target.start_date, date("2022-02-01"));
        assert_eq!(target.total_pages, 412.0);
    }

    #[test]
    fn test_filter_by_title() {
        let record = ReadingRecord::new("The Pastures of Heaven", date("2022-02-01"))
            .with_author("Steinbeck, John");

        assert!(RecordFilter::default().matches(&record));
        assert!(RecordFilter { title: Some("pastures".into()) }.matches(&record));
        assert!(!RecordFilter { title: Some("grapes".into()) }.matches(&record));
    }

    #[test]
    fn test_record_json_defaults() {
        let json = format!(
            r#"{{"id":"{}","title":"Dune","start_date":"2023-01-05","created_at":"2023-01-05T08:00:00Z"}}"#,
            RecordId::new()
        );
        let record: ReadingRecord = serde_json::from_str(&json).unwrap();
        assert!(record.observations.is_empty());
        assert!(record.total_pages.is_none());
        assert!(record.author.is_none());
    }
}
