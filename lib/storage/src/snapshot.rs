// Compacted store image: gzip-compressed JSON, replaced atomically
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use oddsim_core::{Error, HistoricalRecord, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bumped when the on-disk layout changes
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Full store contents at one revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Highest revision contained in `records`
    pub revision: u64,
    /// Shared with the live store while a snapshot is written
    pub records: Vec<Arc<HistoricalRecord>>,
}

impl StoreSnapshot {
    pub fn new(revision: u64, records: Vec<Arc<HistoricalRecord>>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            revision,
            records,
        }
    }
}

/// Snapshot description for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub records: usize,
    pub revision: u64,
    pub size: u64,
    pub checksum: String,
}

/// Location of the store's snapshot file
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Compress and write `snapshot`, replacing any previous file atomically
    pub fn write(&self, snapshot: &StoreSnapshot) -> Result<SnapshotDescription> {
        let json = serde_json::to_vec(snapshot)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&compressed))
            .map_err(|e| Error::Store(format!("snapshot write to {} failed: {}", self.path.display(), e)))?;

        Ok(SnapshotDescription {
            path: self.path.display().to_string(),
            created_at: snapshot.created_at,
            records: snapshot.records.len(),
            revision: snapshot.revision,
            size: compressed.len() as u64,
            checksum: format!("{:x}", Sha256::digest(&compressed)),
        })
    }

    /// `None` when no snapshot has been written yet
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| Error::Store(format!("corrupt snapshot {}: {}", self.path.display(), e)))?;

        let snapshot: StoreSnapshot = serde_json::from_slice(&json)?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::Store(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(Some(snapshot))
    }
}
