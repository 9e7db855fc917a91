//! Request-level result cache keyed by query fingerprint
//!
//! Entries are visible to `get` while younger than the TTL and are removed
//! lazily by `put` and `purge_expired`. Writes to the record store do not
//! invalidate entries; a cached list can be up to one TTL stale.

use ahash::AHashMap;
use oddsim_core::{MatchResult, Query};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stable key for a query: SHA-256 over the target rounded to 3 decimals,
/// the metric name, the threshold (6 decimals) and the minimum count
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(query: &Query) -> Self {
        let mut canonical = String::with_capacity(96);
        for price in query.target.as_slice() {
            canonical.push_str(&format!("{:.3}|", price));
        }
        canonical.push_str(query.metric.as_str());
        canonical.push_str(&format!("|{:.6}|{}", query.threshold, query.min_count));
        Fingerprint(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct CacheEntry {
    matches: Arc<Vec<MatchResult>>,
    created: Instant,
    accesses: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created.elapsed() >= ttl
    }
}

/// A cache hit
#[derive(Debug, Clone)]
pub struct CachedMatches {
    pub matches: Arc<Vec<MatchResult>>,
    pub age: Duration,
    /// Hits on this entry, including this one
    pub accesses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<AHashMap<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(AHashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CachedMatches> {
        let entries = self.entries.read();
        match entries.get(fingerprint) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                let accesses = entry.accesses.fetch_add(1, Ordering::Relaxed) + 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(CachedMatches {
                    matches: Arc::clone(&entry.matches),
                    age: entry.created.elapsed(),
                    accesses,
                })
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `matches`, dropping any expired entries first
    pub fn put(&self, fingerprint: Fingerprint, matches: impl Into<Arc<Vec<MatchResult>>>) {
        let ttl = self.ttl;
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired(ttl));
        entries.insert(
            fingerprint,
            CacheEntry {
                matches: matches.into(),
                created: Instant::now(),
                accesses: AtomicU64::new(0),
            },
        );
    }

    /// Remove every entry; returns how many were removed
    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsim_core::{HistoricalRecord, Metric, PriceVector};

    fn query(target: [f64; 5], metric: Metric, threshold: f64, min_count: usize) -> Query {
        Query::new(PriceVector::new(target).unwrap(), metric, threshold, min_count).unwrap()
    }

    const T: [f64; 5] = [2.10, 3.40, 3.20, 1.85, 1.95];

    fn matches(n: usize) -> Vec<MatchResult> {
        (0..n)
            .map(|i| MatchResult::new(Arc::new(HistoricalRecord::new(format!("m{}", i))), 0.9))
            .collect()
    }

    #[test]
    fn test_fingerprint_rounding() {
        let a = Fingerprint::of(&query(T, Metric::Cosine, 0.9, 10));
        let b = Fingerprint::of(&query([2.1001, 3.40, 3.20, 1.85, 1.95], Metric::Cosine, 0.9, 10));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_parameters() {
        let base = Fingerprint::of(&query(T, Metric::Cosine, 0.9, 10));
        assert_ne!(base, Fingerprint::of(&query([2.11, 3.40, 3.20, 1.85, 1.95], Metric::Cosine, 0.9, 10)));
        assert_ne!(base, Fingerprint::of(&query(T, Metric::MedianPercentage, 0.9, 10)));
        assert_ne!(base, Fingerprint::of(&query(T, Metric::Cosine, 0.95, 10)));
        assert_ne!(base, Fingerprint::of(&query(T, Metric::Cosine, 0.9, 5)));
    }

    #[test]
    fn test_get_put_counts() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let fp = Fingerprint::of(&query(T, Metric::Cosine, 0.9, 10));
        assert!(cache.get(&fp).is_none());

        cache.put(fp.clone(), matches(3));
        let first = cache.get(&fp).unwrap();
        let second = cache.get(&fp).unwrap();
        assert_eq!(first.matches.len(), 3);
        assert!(Arc::ptr_eq(&first.matches, &second.matches));
        assert_eq!(second.accesses, 2);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = ResultCache::new(Duration::ZERO);
        let fp = Fingerprint::of(&query(T, Metric::Cosine, 0.9, 10));
        cache.put(fp.clone(), matches(1));
        assert!(cache.get(&fp).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put(Fingerprint::of(&query(T, Metric::Cosine, 0.9, 10)), matches(1));
        cache.put(Fingerprint::of(&query(T, Metric::Cosine, 0.8, 10)), matches(2));
        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.invalidate_all(), 0);
    }
}
