//! Corpus scan with threshold/fallback selection
//!
//! The scan is a pure map step (encode + score per record) that may be split
//! into chunks and run on a bounded worker pool. Chunk outputs are joined in
//! chunk order, then a single-threaded stable sort and selection produce the
//! final list, so the result never depends on scheduling.

use crate::distance::score_prices;
use crate::memo::ScoreMemo;
use oddsim_core::{
    CorpusSource, Deadline, EngineConfig, HistoricalRecord, MatchResult, Metric, PriceVector,
    Query, Result,
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// Scan tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    pub min_quality: f64,
    pub parallel_cutover: usize,
    pub chunk_size: usize,
    pub max_workers: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MatcherConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_quality: config.min_quality,
            parallel_cutover: config.parallel_cutover,
            chunk_size: config.chunk_size.max(1),
            max_workers: config.max_workers.max(1),
        }
    }
}

/// Finds the historical records closest to a target vector
pub struct Matcher {
    config: MatcherConfig,
    pool: Option<rayon::ThreadPool>,
    memo: Option<Arc<ScoreMemo>>,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        let pool = if config.max_workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.max_workers)
                .thread_name(|i| format!("oddsim-scan-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("scan pool unavailable, scanning sequentially: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            config,
            pool,
            memo: None,
        }
    }

    #[must_use]
    pub fn with_memo(mut self, memo: Arc<ScoreMemo>) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn memo(&self) -> Option<&Arc<ScoreMemo>> {
        self.memo.as_ref()
    }

    /// Pull complete records from `source`, score them and select the matches
    ///
    /// An empty corpus yields an empty list. The deadline is checked between
    /// chunks; on expiry the partial scan is dropped.
    pub fn find(
        &self,
        source: &dyn CorpusSource,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<Vec<MatchResult>> {
        let records = source.complete_records(self.config.min_quality)?;
        if records.is_empty() {
            debug!("empty corpus, nothing to match");
            return Ok(Vec::new());
        }

        let scored = self.scan(&records, &query.target, query.metric, deadline)?;
        debug!(
            corpus = records.len(),
            scored = scored.len(),
            metric = %query.metric,
            "corpus scan finished"
        );
        Ok(select(scored, query.threshold, query.min_count))
    }

    /// Score every record against `target`, preserving input order
    ///
    /// Records whose prices fail to encode or score are skipped.
    pub fn scan(
        &self,
        records: &[Arc<HistoricalRecord>],
        target: &PriceVector,
        metric: Metric,
        deadline: &Deadline,
    ) -> Result<Vec<MatchResult>> {
        let chunk_size = self.config.chunk_size;

        match &self.pool {
            Some(pool) if records.len() > self.config.parallel_cutover => {
                let chunks: Vec<Vec<MatchResult>> = pool.install(|| {
                    records
                        .par_chunks(chunk_size)
                        .map(|chunk| -> Result<Vec<MatchResult>> {
                            deadline.check()?;
                            Ok(self.score_chunk(chunk, target, metric))
                        })
                        .collect::<Result<Vec<_>>>()
                })?;
                Ok(chunks.into_iter().flatten().collect())
            }
            _ => {
                let mut scored = Vec::with_capacity(records.len());
                for chunk in records.chunks(chunk_size) {
                    deadline.check()?;
                    scored.extend(self.score_chunk(chunk, target, metric));
                }
                Ok(scored)
            }
        }
    }

    fn score_chunk(
        &self,
        chunk: &[Arc<HistoricalRecord>],
        target: &PriceVector,
        metric: Metric,
    ) -> Vec<MatchResult> {
        chunk
            .iter()
            .filter_map(|record| self.score_record(record, target, metric))
            .collect()
    }

    fn score_record(
        &self,
        record: &Arc<HistoricalRecord>,
        target: &PriceVector,
        metric: Metric,
    ) -> Option<MatchResult> {
        let vector = match record.prices.to_vector() {
            Ok(v) => v,
            Err(e) => {
                debug!(id = %record.id, "skipping record: {}", e);
                return None;
            }
        };
        let scored = match &self.memo {
            Some(memo) => memo.score(target, &vector, metric),
            None => score_prices(target, &vector, metric),
        };
        match scored {
            Ok(similarity) => Some(MatchResult::new(record.clone(), similarity)),
            Err(e) => {
                debug!(id = %record.id, "skipping record: {}", e);
                None
            }
        }
    }
}

/// Order by descending score and apply the threshold with fallback
///
/// Equal scores keep their input order. If fewer than `min_count` results
/// reach `threshold`, the threshold is dropped and the top `min_count` by raw
/// score are returned instead (or everything, for a smaller corpus).
pub fn select(mut scored: Vec<MatchResult>, threshold: f64, min_count: usize) -> Vec<MatchResult> {
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let above = scored
        .iter()
        .take_while(|m| m.similarity >= threshold)
        .count();

    if above >= min_count {
        scored.truncate(above);
    } else {
        debug!(
            above,
            threshold, min_count, "too few matches above threshold, returning top by score"
        );
        scored.truncate(min_count);
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsim_core::{Error, Outcome, PriceFields};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::Duration;

    const TARGET: [f64; 5] = [2.10, 3.40, 3.20, 1.85, 1.95];

    fn record(id: &str, prices: [f64; 5]) -> Arc<HistoricalRecord> {
        let mut r = HistoricalRecord::new(id).with_prices(PriceFields {
            home: Some(prices[0]),
            draw: Some(prices[1]),
            away: Some(prices[2]),
            over_25: Some(prices[3]),
            under_25: Some(prices[4]),
        });
        r.quality = 1.0;
        Arc::new(r)
    }

    fn random_corpus(n: usize, seed: u64) -> Vec<Arc<HistoricalRecord>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let mut p = [0.0; 5];
                for x in p.iter_mut() {
                    *x = rng.random_range(1.2..6.0);
                }
                record(&i.to_string(), p)
            })
            .collect()
    }

    fn query(threshold: f64, min_count: usize, metric: Metric) -> Query {
        Query::new(PriceVector::new(TARGET).unwrap(), metric, threshold, min_count).unwrap()
    }

    fn sequential() -> Matcher {
        Matcher::new(MatcherConfig {
            max_workers: 1,
            ..Default::default()
        })
    }

    #[test]
    fn test_identical_vector_ranks_first() {
        let mut corpus = random_corpus(20, 1);
        let mut exact = HistoricalRecord::new("exact")
            .with_prices(PriceFields::from_vector(&PriceVector::new(TARGET).unwrap()))
            .with_outcome(Outcome::Home);
        exact.quality = 1.0;
        corpus.push(Arc::new(exact));

        let results = sequential()
            .find(&corpus, &query(0.9, 1, Metric::Cosine), &Deadline::none())
            .unwrap();
        assert_eq!(results[0].id(), "exact");
        assert_eq!(results[0].similarity, 1.0);
    }

    #[test]
    fn test_fallback_returns_min_count() {
        let corpus = random_corpus(50, 2);
        let matcher = sequential();
        let strict = matcher
            .find(&corpus, &query(1.0, 10, Metric::Cosine), &Deadline::none())
            .unwrap();
        assert_eq!(strict.len(), 10);
        assert!(strict.windows(2).all(|w| w[0].similarity >= w[1].similarity));

        // Those ten are the ten best of the whole corpus
        let all = matcher
            .find(&corpus, &query(0.0, 1, Metric::Cosine), &Deadline::none())
            .unwrap();
        assert_eq!(all.len(), 50);
        let top: Vec<&str> = all.iter().take(10).map(|m| m.id()).collect();
        let got: Vec<&str> = strict.iter().map(|m| m.id()).collect();
        assert_eq!(top, got);
    }

    #[test]
    fn test_fallback_on_small_corpus_returns_everything() {
        let corpus = random_corpus(4, 3);
        let results = sequential()
            .find(&corpus, &query(0.99, 10, Metric::NormalizedEuclidean), &Deadline::none())
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_threshold_keeps_all_above() {
        let target = PriceVector::new(TARGET).unwrap();
        let corpus: Vec<_> = (0..12).map(|i| record(&i.to_string(), TARGET)).collect();
        let results = sequential()
            .find(
                &corpus,
                &Query::new(target, Metric::Cosine, 0.95, 3).unwrap(),
                &Deadline::none(),
            )
            .unwrap();
        assert_eq!(results.len(), 12);
    }

    #[test]
    fn test_empty_corpus() {
        let corpus: Vec<Arc<HistoricalRecord>> = Vec::new();
        let results = sequential()
            .find(&corpus, &query(0.9, 10, Metric::Cosine), &Deadline::none())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_skips_incomplete_and_low_quality_records() {
        let mut corpus = random_corpus(5, 4);
        let mut partial = HistoricalRecord::new("partial").with_prices(PriceFields {
            home: Some(2.1),
            ..Default::default()
        });
        partial.quality = 1.0;
        corpus.push(Arc::new(partial));
        let mut poor = (*record("poor", TARGET)).clone();
        poor.quality = 0.2;
        corpus.push(Arc::new(poor));

        let results = sequential()
            .find(&corpus, &query(0.0, 1, Metric::Cosine), &Deadline::none())
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|m| m.id() != "partial" && m.id() != "poor"));
    }

    #[test]
    fn test_ties_keep_source_order() {
        let corpus: Vec<_> = ["newest", "middle", "oldest"]
            .iter()
            .map(|id| record(id, [2.0, 3.0, 4.0, 1.9, 1.9]))
            .collect();
        let results = sequential()
            .find(&corpus, &query(0.0, 1, Metric::Cosine), &Deadline::none())
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_parallel_scan_matches_sequential() {
        let corpus = random_corpus(3000, 5);
        let parallel = Matcher::new(MatcherConfig {
            min_quality: 0.5,
            parallel_cutover: 1000,
            chunk_size: 97,
            max_workers: 4,
        });
        for metric in Metric::ALL {
            let q = query(0.97, 25, metric);
            let a = sequential().find(&corpus, &q, &Deadline::none()).unwrap();
            let b = parallel.find(&corpus, &q, &Deadline::none()).unwrap();
            let ids_a: Vec<&str> = a.iter().map(|m| m.id()).collect();
            let ids_b: Vec<&str> = b.iter().map(|m| m.id()).collect();
            assert_eq!(ids_a, ids_b, "ordering differs for {}", metric);
        }
    }

    #[test]
    fn test_expired_deadline_aborts_scan() {
        let corpus = random_corpus(10, 6);
        let err = sequential()
            .find(
                &corpus,
                &query(0.9, 1, Metric::Cosine),
                &Deadline::after(Duration::ZERO),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_memo_is_consulted() {
        let corpus = random_corpus(10, 8);
        let memo = Arc::new(ScoreMemo::new(1024));
        let matcher = sequential().with_memo(memo.clone());
        let q = query(0.9, 3, Metric::Cosine);
        let first = matcher.find(&corpus, &q, &Deadline::none()).unwrap();
        let second = matcher.find(&corpus, &q, &Deadline::none()).unwrap();
        assert_eq!(first, second);
        assert_eq!(memo.stats().hits, 10);
    }
}
