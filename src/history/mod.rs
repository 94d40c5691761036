//! Bounded, age-limited log of accepted codes, persisted as one blob.

pub mod codec;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use crate::db::Database;
use crate::models::CodeRecord;

pub use codec::{decode_history, encode_history};

pub const DEFAULT_MAX_RECORDS: usize = 20;
pub const DEFAULT_RETENTION_HOURS: f64 = 48.0;

/// Convert a retention window expressed in (possibly fractional) hours.
pub fn retention_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Newest-first history log.
///
/// Length never exceeds `max_records`. Records older than the retention window are
/// removed by [`HistoryStore::evict_expired`], never lazily on read.
pub struct HistoryStore {
    records: Vec<CodeRecord>,
    max_records: usize,
    retention: Duration,
    db: Database,
}

impl HistoryStore {
    pub fn new(db: Database, max_records: usize, retention: Duration) -> Self {
        Self {
            records: Vec::new(),
            max_records,
            retention,
            db,
        }
    }

    pub fn records(&self) -> &[CodeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn set_retention(&mut self, retention: Duration) {
        self.retention = retention;
    }

    pub fn is_expired(&self, record: &CodeRecord, now: DateTime<Utc>) -> bool {
        record.age_at(now) > self.retention
    }

    /// Prepend a record and drop the oldest overflow. Persists only on change.
    pub async fn insert(&mut self, record: CodeRecord) -> Result<()> {
        if self.max_records == 0 {
            return Ok(());
        }

        self.records.insert(0, record);
        self.records.truncate(self.max_records);
        self.persist().await
    }

    /// Remove every record older than the retention window at `now`.
    pub async fn evict_expired(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let retention = self.retention;
        let old_count = self.records.len();
        self.records.retain(|record| record.age_at(now) <= retention);

        let removed = old_count - self.records.len();
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.persist().await
    }

    /// Replace the in-memory log with the persisted one, then evict expired records.
    ///
    /// A corrupt blob yields an empty log rather than an error.
    pub async fn load_from_storage(&mut self, now: DateTime<Utc>) -> Result<()> {
        let loaded = match self.db.load_history_blob().await? {
            Some(blob) => match decode_history(&blob) {
                Ok(records) => records,
                Err(err) => {
                    warn!("Discarding unreadable history blob: {err:#}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        self.records = loaded;
        self.records.truncate(self.max_records);
        let removed = self.evict_expired(now).await?;
        info!(
            "Loaded {} history records ({} expired on load)",
            self.records.len(),
            removed
        );
        Ok(())
    }

    pub async fn persist(&self) -> Result<()> {
        let blob = encode_history(&self.records)?;
        self.db.save_history_blob(blob).await
    }
}
