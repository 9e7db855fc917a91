// Read side of the record store as seen by the matcher
use crate::record::HistoricalRecord;
use crate::Result;
use std::sync::Arc;

/// Source of complete historical records
///
/// Implementations return records with all five prices present and valid and
/// `quality >= min_quality`, most recently updated first. The returned list
/// must be a consistent snapshot: no partially-written record.
pub trait CorpusSource: Send + Sync {
    fn complete_records(&self, min_quality: f64) -> Result<Vec<Arc<HistoricalRecord>>>;
}

/// In-memory corpus, already in iteration order
impl CorpusSource for [Arc<HistoricalRecord>] {
    fn complete_records(&self, min_quality: f64) -> Result<Vec<Arc<HistoricalRecord>>> {
        Ok(self
            .iter()
            .filter(|r| r.is_complete(min_quality))
            .cloned()
            .collect())
    }
}

impl CorpusSource for Vec<Arc<HistoricalRecord>> {
    fn complete_records(&self, min_quality: f64) -> Result<Vec<Arc<HistoricalRecord>>> {
        self.as_slice().complete_records(min_quality)
    }
}
