//! Keyed record store with merge-on-write semantics
//!
//! Records live in memory behind a `parking_lot::RwLock` as `Arc`s, so readers
//! clone pointers to whole records and never see a half-applied merge. When
//! opened on a directory, every accepted write goes to the WAL before it is
//! published, and `compact` folds the WAL into a snapshot.

use crate::snapshot::{SnapshotDescription, SnapshotFile, StoreSnapshot};
use crate::wal::WriteAheadLog;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use oddsim_core::{CorpusSource, HistoricalRecord, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const WAL_FILE: &str = "records.wal";
const SNAPSHOT_FILE: &str = "records.snapshot.gz";

/// Whether an upsert created or merged a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub id: String,
    pub status: UpsertStatus,
    pub quality: f64,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub id: String,
    pub error: String,
}

/// Per-record results of a batch upsert
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub accepted: Vec<UpsertOutcome>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_records: usize,
    /// Records with all five prices present and valid
    pub complete_records: usize,
    /// Records with a known outcome
    pub settled_records: usize,
    pub avg_quality: f64,
    pub oldest_update: Option<DateTime<Utc>>,
    pub newest_update: Option<DateTime<Utc>>,
    pub durable: bool,
    /// Directory holding the WAL and snapshot, for a durable store
    pub data_dir: Option<String>,
}

#[derive(Default)]
struct Inner {
    records: AHashMap<String, Arc<HistoricalRecord>>,
    revision: u64,
}

impl Inner {
    /// Install a record exactly as persisted
    fn restore(&mut self, record: Arc<HistoricalRecord>) {
        self.revision = self.revision.max(record.revision);
        self.records.insert(record.id.clone(), record);
    }
}

struct Durability {
    dir: PathBuf,
    wal: WriteAheadLog,
    snapshot: SnapshotFile,
}

pub struct RecordStore {
    inner: RwLock<Inner>,
    durability: Option<Durability>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Volatile store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            durability: None,
        }
    }

    /// Durable store in `dir`: load the snapshot, then replay the WAL on top
    ///
    /// A torn final WAL line is cut off so later appends start on a clean line.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let snapshot = SnapshotFile::new(dir.join(SNAPSHOT_FILE));
        let wal_path = dir.join(WAL_FILE);
        let mut inner = Inner::default();

        if let Some(image) = snapshot.load()? {
            let count = image.records.len();
            inner.revision = image.revision;
            for record in image.records {
                inner.restore(record);
            }
            info!(records = count, revision = inner.revision, "loaded store snapshot");
        }

        let (wal, replay) =
            WriteAheadLog::recover(&wal_path, |record: HistoricalRecord| inner.restore(Arc::new(record)))?;
        info!(
            path = %dir.display(),
            records = inner.records.len(),
            wal_entries = replay.entries,
            "record store opened"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            durability: Some(Durability { dir, wal, snapshot }),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.durability.is_some()
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.durability.as_ref().map(|d| d.dir.as_path())
    }

    /// Insert or merge one record
    ///
    /// Present incoming fields overwrite stored ones; absent fields keep the
    /// stored values. Quality never decreases across merges.
    pub fn upsert(&self, record: HistoricalRecord) -> Result<UpsertOutcome> {
        record.validate()?;

        let mut inner = self.inner.write();
        let (mut merged, status, prior_quality) = match inner.records.get(&record.id) {
            Some(existing) => {
                let mut merged = HistoricalRecord::clone(existing);
                merged.merge_from(&record);
                (merged, UpsertStatus::Updated, existing.quality)
            }
            None => (record, UpsertStatus::Inserted, 0.0),
        };

        merged.derive_outcomes();
        merged.quality = merged.compute_quality().max(prior_quality);
        merged.last_updated = Utc::now();
        merged.revision = inner.revision + 1;

        if let Some(durability) = &self.durability {
            durability.wal.append(&merged)?;
        }

        let outcome = UpsertOutcome {
            id: merged.id.clone(),
            status,
            quality: merged.quality,
            revision: merged.revision,
        };
        inner.revision = merged.revision;
        inner.records.insert(merged.id.clone(), Arc::new(merged));
        debug!(id = %outcome.id, status = ?outcome.status, quality = outcome.quality, "record stored");
        Ok(outcome)
    }

    /// Upsert each record independently; a rejected record never aborts the batch
    pub fn upsert_batch(&self, records: Vec<HistoricalRecord>) -> BatchReport {
        let mut report = BatchReport::default();
        for record in records {
            let id = record.id.clone();
            match self.upsert(record) {
                Ok(outcome) => {
                    match outcome.status {
                        UpsertStatus::Inserted => report.inserted += 1,
                        UpsertStatus::Updated => report.updated += 1,
                    }
                    report.accepted.push(outcome);
                }
                Err(e) => {
                    warn!(id = %id, "rejected record: {}", e);
                    report.rejected.push(RejectedRecord {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    pub fn get(&self, id: &str) -> Option<Arc<HistoricalRecord>> {
        self.inner.read().records.get(id).cloned()
    }

    /// Complete records at or above `min_quality`, newest revision first
    pub fn get_complete(&self, min_quality: f64) -> Vec<Arc<HistoricalRecord>> {
        let mut complete: Vec<_> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| r.is_complete(min_quality))
            .cloned()
            .collect();
        complete.sort_by(|a, b| b.revision.cmp(&a.revision));
        complete
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let total = inner.records.len();
        let mut stats = StoreStats {
            total_records: total,
            durable: self.is_durable(),
            data_dir: self.data_dir().map(|d| d.display().to_string()),
            ..Default::default()
        };
        if total == 0 {
            return stats;
        }

        let mut quality_sum = 0.0;
        for record in inner.records.values() {
            if record.prices.is_complete() {
                stats.complete_records += 1;
            }
            if record.outcome.is_some() {
                stats.settled_records += 1;
            }
            quality_sum += record.quality;
            let ts = record.last_updated;
            stats.oldest_update = Some(stats.oldest_update.map_or(ts, |o| o.min(ts)));
            stats.newest_update = Some(stats.newest_update.map_or(ts, |n| n.max(ts)));
        }
        stats.avg_quality = quality_sum / total as f64;
        stats
    }

    /// Write a snapshot of every record and truncate the WAL
    ///
    /// Readers proceed during compaction; writers wait for it to finish.
    /// Returns `None` for a volatile store.
    pub fn compact(&self) -> Result<Option<SnapshotDescription>> {
        let Some(durability) = &self.durability else {
            return Ok(None);
        };

        let inner = self.inner.upgradable_read();
        let mut records: Vec<Arc<HistoricalRecord>> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| a.revision.cmp(&b.revision));

        let description = durability
            .snapshot
            .write(&StoreSnapshot::new(inner.revision, records))?;
        durability.wal.truncate()?;

        info!(
            records = description.records,
            revision = description.revision,
            size = description.size,
            "store compacted"
        );
        Ok(Some(description))
    }
}

impl CorpusSource for RecordStore {
    fn complete_records(&self, min_quality: f64) -> Result<Vec<Arc<HistoricalRecord>>> {
        Ok(self.get_complete(min_quality))
    }
}
