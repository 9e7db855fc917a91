//! # oddsim Core
//!
//! Core types shared by the oddsim crates:
//!
//! - [`PriceVector`] / [`PriceFields`] - the five quoted prices and the field-map encoder
//! - [`HistoricalRecord`] - a match with prices, outcomes and a derived quality score
//! - [`Query`], [`Metric`], [`MatchResult`] - what a similarity request asks for and returns
//! - [`CorpusSource`] - the read seam between the matcher and the record store
//! - [`EngineConfig`], [`EngineContext`] - configuration and explicit instrumentation
//!
//! ## Example
//!
//! ```rust
//! use oddsim_core::{encode, Metric, Query};
//! use serde_json::json;
//!
//! let fields = json!({
//!     "home": 2.10, "draw": 3.40, "away": 3.20, "over_25": 1.85, "under_25": 1.95
//! });
//! let target = encode(fields.as_object().unwrap()).unwrap();
//! let query = Query::new(target, Metric::Cosine, 0.9, 10).unwrap();
//! assert_eq!(query.min_count, 10);
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod instrument;
pub mod odds;
pub mod query;
pub mod record;

pub use config::EngineConfig;
pub use corpus::CorpusSource;
pub use error::{Error, Result};
pub use instrument::{Deadline, EngineContext, Metrics, OperationStats};
pub use odds::{encode, fields_from_map, PriceFields, PriceVector, PRICE_DIM};
pub use query::{MatchResult, Metric, Query};
pub use record::{HistoricalRecord, Outcome};
