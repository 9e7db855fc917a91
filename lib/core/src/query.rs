use crate::odds::PriceVector;
use crate::record::HistoricalRecord;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Similarity metric used to compare two price vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Cosine,
    #[serde(alias = "euclidean")]
    NormalizedEuclidean,
    #[serde(alias = "percentage")]
    MedianPercentage,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::Cosine,
        Metric::NormalizedEuclidean,
        Metric::MedianPercentage,
    ];

    /// Canonical name, also used in cache fingerprints
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::NormalizedEuclidean => "normalized-euclidean",
            Metric::MedianPercentage => "median-percentage",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "normalized-euclidean" | "euclidean" => Ok(Metric::NormalizedEuclidean),
            "median-percentage" | "percentage" => Ok(Metric::MedianPercentage),
            other => Err(Error::Validation(format!(
                "unknown metric '{}': expected cosine, normalized-euclidean or median-percentage",
                other
            ))),
        }
    }
}

/// A validated similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: PriceVector,
    pub metric: Metric,
    pub threshold: f64,
    pub min_count: usize,
}

impl Query {
    pub fn new(target: PriceVector, metric: Metric, threshold: f64, min_count: usize) -> Result<Self> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Validation(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if min_count == 0 {
            return Err(Error::Validation("minimum result count must be at least 1".to_string()));
        }
        Ok(Self {
            target,
            metric,
            threshold,
            min_count,
        })
    }
}

/// A scored reference to a historical record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub record: Arc<HistoricalRecord>,
    pub similarity: f64,
}

impl MatchResult {
    pub fn new(record: Arc<HistoricalRecord>, similarity: f64) -> Self {
        Self { record, similarity }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> PriceVector {
        PriceVector::new([2.10, 3.40, 3.20, 1.85, 1.95]).unwrap()
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!("Euclidean".parse::<Metric>().unwrap(), Metric::NormalizedEuclidean);
        assert_eq!("percentage".parse::<Metric>().unwrap(), Metric::MedianPercentage);
        assert_eq!(
            "median-percentage".parse::<Metric>().unwrap(),
            Metric::MedianPercentage
        );
        assert!(matches!("manhattan".parse::<Metric>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_metric_round_trips_through_name() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
    }

    #[test]
    fn test_query_validation() {
        assert!(Query::new(target(), Metric::Cosine, 0.9, 10).is_ok());
        assert!(Query::new(target(), Metric::Cosine, 1.0, 1).is_ok());
        assert!(Query::new(target(), Metric::Cosine, 1.01, 10).is_err());
        assert!(Query::new(target(), Metric::Cosine, -0.1, 10).is_err());
        assert!(Query::new(target(), Metric::Cosine, f64::NAN, 10).is_err());
        assert!(Query::new(target(), Metric::Cosine, 0.5, 0).is_err());
    }
}
