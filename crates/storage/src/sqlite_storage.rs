//! SQLite storage backend for booktrack.
//!
//! Keeps records, page observations and computed estimates in three
//! relational tables, mirroring the reading-log schema of the book database.

use std::path::Path;
use async_trait::async_trait;
use booktrack_core::{
    BookTarget, Date, EstimateResult, Observation, ReadingRecord, RecordFilter, RecordId,
    StoredEstimate, Time, DATE_FORMAT,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use super::trait_::{ObservationStore, ResultSink, Storage, StorageError, Result};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn parse_date(s: &str) -> Result<Date> {
    Date::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| StorageError::Invalid(format!("bad date {:?}: {}", s, e)))
}

fn parse_time(s: &str) -> Result<Time> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Invalid(format!("bad timestamp {:?}: {}", s, e)))
}

fn format_date(d: Date) -> String {
    d.format(DATE_FORMAT).to_string()
}

impl SqliteStorage {
    /// Connect using a database URL such as `sqlite://books.db`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(db_url).await.map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Open (creating if missing) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT,
                start_date TEXT NOT NULL,
                total_pages REAL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL,
                record_date TEXT NOT NULL,
                page INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS estimates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL,
                likely_date TEXT NOT NULL,
                earliest_date TEXT NOT NULL,
                latest_date TEXT NOT NULL,
                computed_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_observations_record ON observations(record_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_estimates_record ON estimates(record_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn record_exists(&self, id: RecordId) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n > 0)
    }

    async fn load_observations(&self, id: RecordId) -> Result<Vec<Observation>> {
        let rows = sqlx::query(
            "SELECT record_date, page FROM observations WHERE record_id = ?
            ORDER BY record_date ASC, id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(observation_from_row).collect()
    }

    async fn load_estimates(&self, id: RecordId) -> Result<Vec<StoredEstimate>> {
        let rows = sqlx::query(
            "SELECT likely_date, earliest_date, latest_date, computed_at FROM estimates
            WHERE record_id = ? ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(estimate_from_row).collect()
    }

    async fn complete_record(&self, row: &SqliteRow) -> Result<ReadingRecord> {
        let mut record = record_from_row(row)?;
        record.observations = self.load_observations(record.id).await?;
        record.estimates = self.load_estimates(record.id).await?;
        Ok(record)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ReadingRecord> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let start_date: String = row.try_get("start_date").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;

    Ok(ReadingRecord {
        id: id
            .parse()
            .map_err(|e| StorageError::Invalid(format!("bad record id {:?}: {}", id, e)))?,
        title: row.try_get("title").map_err(db_err)?,
        author: row.try_get("author").map_err(db_err)?,
        start_date: parse_date(&start_date)?,
        total_pages: row.try_get("total_pages").map_err(db_err)?,
        observations: Vec::new(),
        estimates: Vec::new(),
        created_at: parse_time(&created_at)?,
    })
}

fn observation_from_row(row: &SqliteRow) -> Result<Observation> {
    let date: String = row.try_get("record_date").map_err(db_err)?;
    let page: i64 = row.try_get("page").map_err(db_err)?;
    let page = u32::try_from(page)
        .map_err(|_| StorageError::Invalid(format!("bad page number {}", page)))?;
    Ok(Observation::new(parse_date(&date)?, page))
}

fn estimate_from_row(row: &SqliteRow) -> Result<StoredEstimate> {
    let likely: String = row.try_get("likely_date").map_err(db_err)?;
    let earliest: String = row.try_get("earliest_date").map_err(db_err)?;
    let latest: String = row.try_get("latest_date").map_err(db_err)?;
    let computed_at: String = row.try_get("computed_at").map_err(db_err)?;

    Ok(StoredEstimate {
        result: EstimateResult {
            likely_date: parse_date(&likely)?,
            earliest_date: parse_date(&earliest)?,
            latest_date: parse_date(&latest)?,
        },
        computed_at: parse_time(&computed_at)?,
    })
}

#[async_trait]
impl ObservationStore for SqliteStorage {
    async fn fetch_observations(&self, id: RecordId) -> Result<Vec<Observation>> {
        if !self.record_exists(id).await? {
            return Err(StorageError::record_not_found(id));
        }
        self.load_observations(id).await
    }

    async fn fetch_book_target(&self, id: RecordId) -> Result<Option<BookTarget>> {
        let record = self
            .load_record(id)
            .await?
            .ok_or_else(|| StorageError::record_not_found(id))?;
        Ok(record.book_target())
    }
}

#[async_trait]
impl ResultSink for SqliteStorage {
    async fn persist_estimate(
        &self,
        id: RecordId,
        result: &EstimateResult,
        computed_at: Time,
    ) -> Result<()> {
        if !self.record_exists(id).await? {
            return Err(StorageError::record_not_found(id));
        }

        sqlx::query(
            "INSERT INTO estimates (record_id, likely_date, earliest_date, latest_date, computed_at)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(format_date(result.likely_date))
        .bind(format_date(result.earliest_date))
        .bind(format_date(result.latest_date))
        .bind(computed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Saved estimate for record {}", id);
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_record(&mut self, record: &ReadingRecord) -> Result<()> {
        let id = record.id.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT OR REPLACE INTO records (id, title, author, start_date, total_pages, created_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&record.title)
        .bind(&record.author)
        .bind(format_date(record.start_date))
        .bind(record.total_pages)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM observations WHERE record_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for observation in &record.observations {
            sqlx::query("INSERT INTO observations (record_id, record_date, page) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(format_date(observation.date))
                .bind(i64::from(observation.page))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        sqlx::query("DELETE FROM estimates WHERE record_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for estimate in &record.estimates {
            sqlx::query(
                "INSERT INTO estimates (record_id, likely_date, earliest_date, latest_date, computed_at)
                VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(format_date(estimate.result.likely_date))
            .bind(format_date(estimate.result.earliest_date))
            .bind(format_date(estimate.result.latest_date))
            .bind(estimate.computed_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!("Saved record {}", record.id);
        Ok(())
    }

    async fn load_record(&self, id: RecordId) -> Result<Option<ReadingRecord>> {
        let row = sqlx::query(
            "SELECT id, title, author, start_date, total_pages, created_at FROM records WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(self.complete_record(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ReadingRecord>> {
        let rows = sqlx::query(
            "SELECT id, title, author, start_date, total_pages, created_at FROM records
            ORDER BY start_date ASC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = self.complete_record(row).await?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn add_observation(
        &mut self,
        id: RecordId,
        observation: Observation,
    ) -> Result<ReadingRecord> {
        if !self.record_exists(id).await? {
            return Err(StorageError::record_not_found(id));
        }

        sqlx::query("INSERT INTO observations (record_id, record_date, page) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(format_date(observation.date))
            .bind(i64::from(observation.page))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        self.load_record(id)
            .await?
            .ok_or_else(|| StorageError::record_not_found(id))
    }

    async fn set_total_pages(&mut self, id: RecordId, pages: f64) -> Result<ReadingRecord> {
        let done = sqlx::query("UPDATE records SET total_pages = ? WHERE id = ?")
            .bind(pages)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::record_not_found(id));
        }

        self.load_record(id)
            .await?
            .ok_or_else(|| StorageError::record_not_found(id))
    }

    async fn delete_record(&mut self, id: RecordId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM observations WHERE record_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM estimates WHERE record_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> Date {
        Date::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn sample_record() -> ReadingRecord {
        let mut record = ReadingRecord::new("Command and Control", date("2022-02-01"))
            .with_author("Schlosser, Eric")
            .with_total_pages(1000.0);
        record.add_observation(Observation::new(date("2022-02-01"), 0));
        record.add_observation(Observation::new(date("2022-02-03"), 40));
        record
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let mut storage = SqliteStorage::in_memory().await.unwrap();

        let record = sample_record();
        storage.save_record(&record).await.unwrap();

        let loaded = storage.load_record(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, record.title);
        assert_eq!(loaded.author.as_deref(), Some("Schlosser, Eric"));
        assert_eq!(loaded.observations, record.observations);
        assert_eq!(loaded.total_pages, Some(1000.0));
    }

    #[tokio::test]
    async fn test_observation_store_ports() {
        let mut storage = SqliteStorage::in_memory().await.unwrap();

        let record = sample_record();
        storage.save_record(&record).await.unwrap();
        storage
            .add_observation(record.id, Observation::new(date("2022-02-09"), 279))
            .await
            .unwrap();

        let observations = storage.fetch_observations(record.id).await.unwrap();
        let pages: Vec<u32> = observations.iter().map(|o| o.page).collect();
        assert_eq!(pages, vec![0, 40, 279]);

        let target = storage.fetch_book_target(record.id).await.unwrap().unwrap();
        assert_eq!(target.start_date, date("2022-02-01"));

        let missing = storage.fetch_observations(RecordId::new()).await.unwrap_err();
        assert!(matches!(missing, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_persist_and_delete() {
        let mut storage = SqliteStorage::in_memory().await.unwrap();

        let record = sample_record();
        storage.save_record(&record).await.unwrap();

        let result = EstimateResult {
            likely_date: date("2022-02-28"),
            earliest_date: date("2022-02-27"),
            latest_date: date("2022-03-17"),
        };
        storage
            .persist_estimate(record.id, &result, chrono::Utc::now())
            .await
            .unwrap();

        let loaded = storage.load_record(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.latest_estimate().unwrap().result, result);

        storage.delete_record(record.id).await.unwrap();
        assert!(storage.load_record(record.id).await.unwrap().is_none());
        assert!(storage
            .persist_estimate(record.id, &result, chrono::Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_total_pages_and_filter() {
        let mut storage = SqliteStorage::in_memory().await.unwrap();

        let record = ReadingRecord::new("Middlemarch", date("2022-06-01"));
        storage.save_record(&record).await.unwrap();
        assert!(storage.fetch_book_target(record.id).await.unwrap().is_none());

        let updated = storage.set_total_pages(record.id, 880.0).await.unwrap();
        assert_eq!(updated.total_pages, Some(880.0));
        assert!(storage.set_total_pages(RecordId::new(), 10.0).await.is_err());

        let found = storage
            .list_records(&RecordFilter { title: Some("middle".into()) })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
