pub mod cache;
pub mod manager;
pub mod snapshot;
pub mod store;
pub mod wal;

pub use cache::{CacheStats, CachedMatches, Fingerprint, ResultCache};
pub use manager::{AnalysisManager, AnalysisRequest, AnalysisResponse, MetricReport, COMPARE_THRESHOLD};
pub use snapshot::{SnapshotDescription, SnapshotFile, StoreSnapshot};
pub use store::{BatchReport, RecordStore, RejectedRecord, StoreStats, UpsertOutcome, UpsertStatus};
pub use wal::{Replay, WriteAheadLog};
