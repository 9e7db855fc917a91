//! Explicit instrumentation handed to each component
//!
//! Components receive an [`EngineContext`] at construction and wrap the calls
//! they want measured with [`Metrics::timed`]. Nothing here is global.

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Per-operation counters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OperationStats {
    pub calls: u64,
    pub errors: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

impl OperationStats {
    pub fn avg_micros(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_micros / self.calls
        }
    }
}

/// Timing and success/error counters keyed by operation name
#[derive(Debug, Default)]
pub struct Metrics {
    ops: Mutex<AHashMap<&'static str, OperationStats>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, recording its duration and whether it returned an error
    pub fn timed<T, E, F>(&self, op: &'static str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        self.record(op, elapsed, result.is_ok());
        tracing::debug!(op, elapsed_us = elapsed.as_micros() as u64, ok = result.is_ok(), "operation finished");
        result
    }

    pub fn record(&self, op: &'static str, elapsed: Duration, ok: bool) {
        let micros = elapsed.as_micros() as u64;
        let mut ops = self.ops.lock();
        let stats = ops.entry(op).or_default();
        stats.calls += 1;
        if !ok {
            stats.errors += 1;
        }
        stats.total_micros += micros;
        stats.max_micros = stats.max_micros.max(micros);
    }

    pub fn get(&self, op: &str) -> Option<OperationStats> {
        self.ops.lock().get(op).cloned()
    }

    /// Sorted copy of all counters
    pub fn snapshot(&self) -> Vec<(String, OperationStats)> {
        let ops = self.ops.lock();
        let mut all: Vec<_> = ops.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// Context object passed to component constructors
#[derive(Debug, Clone, Default)]
pub struct EngineContext {
    pub metrics: Arc<Metrics>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Wall-clock budget for one request
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    pub fn from_option(budget: Option<Duration>) -> Self {
        match budget {
            Some(b) => Self::after(b),
            None => Self::none(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.budget
            .map(|b| self.started.elapsed() >= b)
            .unwrap_or(false)
    }

    /// `Err(Error::Timeout)` once the budget is spent
    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(b) if self.started.elapsed() >= b => Err(Error::Timeout(b)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_counts_success_and_error() {
        let metrics = Metrics::new();
        let ok: std::result::Result<u32, String> = metrics.timed("find", || Ok(1));
        assert_eq!(ok, Ok(1));
        let err: std::result::Result<u32, String> = metrics.timed("find", || Err("boom".into()));
        assert!(err.is_err());

        let stats = metrics.get("find").unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.errors, 1);
        assert!(metrics.get("analyze").is_none());
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::none().check().is_ok());
        assert!(Deadline::after(Duration::from_secs(60)).check().is_ok());
        let expired = Deadline::after(Duration::ZERO);
        assert!(expired.is_expired());
        assert!(matches!(expired.check(), Err(Error::Timeout(_))));
    }
}
