use crate::query::Metric;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the analysis engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_metric: Metric,
    pub default_threshold: f64,
    pub default_min_count: usize,
    /// Records below this quality are never scanned
    pub min_quality: f64,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Complete-record count above which the scan is split across workers
    pub parallel_cutover: usize,
    pub chunk_size: usize,
    pub max_workers: usize,
    /// Matches returned per response
    pub response_limit: usize,
    /// Pairwise score memo capacity; 0 disables the memo
    pub score_memo_capacity: usize,
    #[serde(with = "opt_duration_millis")]
    pub request_timeout: Option<Duration>,
    #[serde(with = "opt_duration_secs")]
    pub maintenance_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_metric: Metric::Cosine,
            default_threshold: 0.90,
            default_min_count: 10,
            min_quality: 0.5,
            cache_ttl: Duration::from_secs(3600),
            parallel_cutover: 1000,
            chunk_size: 256,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            response_limit: 50,
            score_memo_capacity: 0,
            request_timeout: None,
            maintenance_interval: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(Error::Validation(format!(
                "default threshold must be within [0, 1], got {}",
                self.default_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_quality) {
            return Err(Error::Validation(format!(
                "min quality must be within [0, 1], got {}",
                self.min_quality
            )));
        }
        if self.default_min_count == 0 {
            return Err(Error::Validation("default min count must be at least 1".to_string()));
        }
        if self.chunk_size == 0 || self.max_workers == 0 {
            return Err(Error::Validation(
                "chunk size and worker count must be positive".to_string(),
            ));
        }
        if self.response_limit == 0 {
            return Err(Error::Validation("response limit must be positive".to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

mod opt_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
