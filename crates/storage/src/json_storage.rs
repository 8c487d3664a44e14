//! JSON file storage implementation.
//!
//! Stores one JSON file per reading record in a `.booktrack` directory and
//! keeps small per-record meta markers (version + updated_at).

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use booktrack_core::{
    BookTarget, EstimateResult, Observation, ReadingRecord, RecordFilter, RecordId,
    StoredEstimate, Time,
};
use super::{ObservationStore, ResultSink, Storage, StorageError, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    // Serializes read-modify-write cycles on record files.
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage, creating the `records/` and `meta/` subdirectories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("records")).await?;
        fs::create_dir_all(root.join("meta").join("records")).await?;

        debug!("Opened JSON storage at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.root.join("records").join(format!("{}.json", id))
    }

    fn meta_path(&self, id: RecordId) -> PathBuf {
        self.root.join("meta").join("records").join(format!("{}.meta.json", id))
    }

    /// Read and increment the per-record version, return new version.
    async fn bump_version(&self, id: RecordId) -> Result<u64> {
        let path = self.meta_path(id);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn write_record(&self, record: &ReadingRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(self.record_path(record.id), json.as_bytes()).await?;

        // Meta failures do not fail the write.
        match self.bump_version(record.id).await {
            Ok(version) => debug!("Wrote record {} (version {})", record.id, version),
            Err(e) => warn!("Wrote record {} but could not update its meta: {}", record.id, e),
        }
        Ok(())
    }

    async fn require_record(&self, id: RecordId) -> Result<ReadingRecord> {
        read_json(&self.record_path(id))
            .await?
            .ok_or_else(|| StorageError::record_not_found(id))
    }

    /// Load, modify and write back a record under the write lock.
    async fn update_record<F>(&self, id: RecordId, update: F) -> Result<ReadingRecord>
    where
        F: FnOnce(&mut ReadingRecord) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self.require_record(id).await?;
        update(&mut record);
        self.write_record(&record).await?;
        Ok(record)
    }
}

#[async_trait]
impl ObservationStore for JsonStorage {
    async fn fetch_observations(&self, id: RecordId) -> Result<Vec<Observation>> {
        Ok(self.require_record(id).await?.observations)
    }

    async fn fetch_book_target(&self, id: RecordId) -> Result<Option<BookTarget>> {
        Ok(self.require_record(id).await?.book_target())
    }
}

#[async_trait]
impl ResultSink for JsonStorage {
    async fn persist_estimate(
        &self,
        id: RecordId,
        result: &EstimateResult,
        computed_at: Time,
    ) -> Result<()> {
        let stored = StoredEstimate { result: *result, computed_at };
        self.update_record(id, move |record| record.estimates.push(stored))
            .await?;
        info!("Saved estimate for record {}", id);
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn save_record(&mut self, record: &ReadingRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_record(record).await
    }

    async fn load_record(&self, id: RecordId) -> Result<Option<ReadingRecord>> {
        read_json(&self.record_path(id)).await
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ReadingRecord>> {
        let mut records: Vec<ReadingRecord> = list_dir(&self.root.join("records")).await?;
        records.retain(|r| filter.matches(r));
        records.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn add_observation(
        &mut self,
        id: RecordId,
        observation: Observation,
    ) -> Result<ReadingRecord> {
        self.update_record(id, move |record| record.add_observation(observation))
            .await
    }

    async fn set_total_pages(&mut self, id: RecordId, pages: f64) -> Result<ReadingRecord> {
        self.update_record(id, move |record| record.total_pages = Some(pages))
            .await
    }

    async fn delete_record(&mut self, id: RecordId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for path in [self.record_path(id), self.meta_path(id)] {
            fs::remove_file(path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
            })?;
        }
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable file {}: {}", entry.path().display(), e),
        }
    }
    Ok(items)
}
