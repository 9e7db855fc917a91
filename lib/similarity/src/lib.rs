//! # oddsim Similarity
//!
//! Scoring, matching and aggregation over historical price vectors.
//!
//! ## Features
//!
//! - **Metrics**: cosine, normalized Euclidean and median-percentage scores in [0, 1]
//! - **Matcher**: threshold selection with a minimum-count fallback, parallel above a cutover
//! - **Aggregation**: similarity statistics, outcome distributions and a confidence score
//! - **Score memo**: optional pairwise cache below the request-level result cache
//!
//! ## Example
//!
//! ```rust
//! use oddsim_core::{Deadline, HistoricalRecord, Metric, PriceFields, PriceVector, Query};
//! use oddsim_similarity::{analyze, Matcher, MatcherConfig};
//! use std::sync::Arc;
//!
//! let target = PriceVector::new([2.10, 3.40, 3.20, 1.85, 1.95]).unwrap();
//! let mut record = HistoricalRecord::new("m1")
//!     .with_prices(PriceFields::from_vector(&target))
//!     .with_score(2, 1);
//! record.derive_outcomes();
//! record.quality = record.compute_quality();
//! let corpus = vec![Arc::new(record)];
//!
//! let matcher = Matcher::new(MatcherConfig::default());
//! let query = Query::new(target, Metric::Cosine, 0.9, 1).unwrap();
//! let matches = matcher.find(&corpus, &query, &Deadline::none()).unwrap();
//! assert_eq!(matches[0].similarity, 1.0);
//!
//! let analysis = analyze(&matches);
//! assert_eq!(analysis.total_matches, 1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Corpus    │────>│   Matcher   │────>│  Aggregate  │
//! │  (records)  │     │ (score+pick)│     │ (analysis)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                     ┌─────────────┐
//!                     │  Distance   │<──── ScoreMemo
//!                     │  (metrics)  │
//!                     └─────────────┘
//! ```

pub mod aggregate;
pub mod distance;
pub mod matcher;
pub mod memo;

pub use aggregate::{
    analyze, confidence_score, AggregateAnalysis, BinaryDistribution, CategoryShare, Forecast,
    ForecastSource, OutcomeDistribution, SimilarityStats,
};
pub use distance::{score, score_prices, PERCENTAGE_EPSILON};
pub use matcher::{select, Matcher, MatcherConfig};
pub use memo::{MemoStats, ScoreMemo};
