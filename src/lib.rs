//! # oddsim
//!
//! A similarity engine over historical betting prices. Given the five quoted
//! prices of an upcoming match (home / draw / away / over 2.5 / under 2.5),
//! oddsim finds past matches that were priced alike, summarizes how they
//! ended and turns that into a forecast.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! oddsim --data-dir ./data --http-port 8080 --threshold 0.9 --min-matches 10
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use oddsim::prelude::*;
//! use serde_json::json;
//!
//! let manager = AnalysisManager::new(EngineConfig::default(), EngineContext::new()).unwrap();
//!
//! let record: HistoricalRecord = serde_json::from_value(json!({
//!     "id": "2023-04-01-juv-int",
//!     "home_odds": 2.10, "draw_odds": 3.40, "away_odds": 3.20,
//!     "over_25_odds": 1.85, "under_25_odds": 1.95,
//!     "home_score": 1, "away_score": 1
//! })).unwrap();
//! manager.upsert(record).unwrap();
//!
//! let request: AnalysisRequest = serde_json::from_value(json!({
//!     "odds": {"home": 2.10, "draw": 3.40, "away": 3.20, "over_25": 1.85, "under_25": 1.95}
//! })).unwrap();
//! let response = manager.analyze(&request, None).unwrap();
//! assert_eq!(response.matches[0].similarity, 1.0);
//! ```
//!
//! ## Crate Structure
//!
//! - `oddsim-core` - price vectors, records, queries, configuration, errors
//! - `oddsim-similarity` - metrics, matcher, aggregation, forecast
//! - `oddsim-storage` - record store (WAL, snapshots), result cache, analysis manager
//! - `oddsim-api` - REST API

// Re-export core types
pub use oddsim_core::{
    encode, CorpusSource, Deadline, EngineConfig, EngineContext, Error, HistoricalRecord,
    MatchResult, Metric, Metrics, Outcome, PriceFields, PriceVector, Query, Result,
};

// Re-export similarity
pub use oddsim_similarity::{
    analyze, score, AggregateAnalysis, Forecast, ForecastSource, Matcher, MatcherConfig, ScoreMemo,
};

// Re-export storage
pub use oddsim_storage::{
    AnalysisManager, AnalysisRequest, AnalysisResponse, RecordStore, ResultCache,
};

// Re-export API
pub use oddsim_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        encode, AggregateAnalysis, AnalysisManager, AnalysisRequest, AnalysisResponse, Deadline,
        EngineConfig, EngineContext, Error, Forecast, HistoricalRecord, MatchResult, Matcher,
        MatcherConfig, Metric, Outcome, PriceFields, PriceVector, Query, RecordStore, Result,
    };
}
