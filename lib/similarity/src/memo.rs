//! Pairwise score memo
//!
//! A computation-level cache of raw scores between two price vectors. It sits
//! below the request-level result cache and knows nothing about queries,
//! thresholds or record ids.

use crate::distance::score_prices;
use ahash::AHashMap;
use oddsim_core::{Metric, PriceVector, Result, PRICE_DIM};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Vectors are quantized to this step before keying
const QUANTUM: f64 = 1e-6;

type Quantized = [i64; PRICE_DIM];

fn quantize(v: &PriceVector) -> Quantized {
    let mut q = [0i64; PRICE_DIM];
    for (slot, x) in q.iter_mut().zip(v.as_slice()) {
        *slot = (x / QUANTUM).round() as i64;
    }
    q
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    metric: Metric,
    // Ordered pair so that (a, b) and (b, a) share a slot
    lo: Quantized,
    hi: Quantized,
}

impl MemoKey {
    fn new(a: &PriceVector, b: &PriceVector, metric: Metric) -> Self {
        let (qa, qb) = (quantize(a), quantize(b));
        let (lo, hi) = if qa <= qb { (qa, qb) } else { (qb, qa) };
        Self { metric, lo, hi }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded memo of pairwise scores; cleared wholesale when full
#[derive(Debug)]
pub struct ScoreMemo {
    capacity: usize,
    scores: RwLock<AHashMap<MemoKey, f64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScoreMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            scores: RwLock::new(AHashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Memoized [`score_prices`]; errors are never cached
    pub fn score(&self, a: &PriceVector, b: &PriceVector, metric: Metric) -> Result<f64> {
        let key = MemoKey::new(a, b, metric);
        if let Some(s) = self.scores.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*s);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let s = score_prices(a, b, metric)?;
        let mut scores = self.scores.write();
        if scores.len() >= self.capacity {
            scores.clear();
        }
        scores.insert(key, s);
        Ok(s)
    }

    pub fn clear(&self) {
        self.scores.write().clear();
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.scores.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(data: [f64; 5]) -> PriceVector {
        PriceVector::new(data).unwrap()
    }

    #[test]
    fn test_memo_hits_on_reversed_pair() {
        let memo = ScoreMemo::new(16);
        let a = v([2.10, 3.40, 3.20, 1.85, 1.95]);
        let b = v([2.05, 3.45, 3.25, 1.90, 1.90]);

        let first = memo.score(&a, &b, Metric::Cosine).unwrap();
        let second = memo.score(&b, &a, Metric::Cosine).unwrap();
        assert_eq!(first, second);

        let stats = memo.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_memo_separates_metrics() {
        let memo = ScoreMemo::new(16);
        let a = v([2.10, 3.40, 3.20, 1.85, 1.95]);
        let b = v([1.40, 4.50, 7.00, 2.20, 1.65]);
        memo.score(&a, &b, Metric::Cosine).unwrap();
        memo.score(&a, &b, Metric::MedianPercentage).unwrap();
        assert_eq!(memo.stats().entries, 2);
        assert_eq!(memo.stats().hits, 0);
    }

    #[test]
    fn test_memo_clears_when_full() {
        let memo = ScoreMemo::new(2);
        let a = v([2.10, 3.40, 3.20, 1.85, 1.95]);
        for i in 0..3 {
            let b = v([2.0 + i as f64 * 0.1, 3.4, 3.2, 1.85, 1.95]);
            memo.score(&a, &b, Metric::Cosine).unwrap();
        }
        assert_eq!(memo.stats().entries, 1);
    }
}
