use crate::cache::{CacheStats, Fingerprint, ResultCache};
use crate::snapshot::SnapshotDescription;
use crate::store::{BatchReport, RecordStore, StoreStats, UpsertOutcome};
use oddsim_core::{
    encode, Deadline, EngineConfig, EngineContext, Error, HistoricalRecord, MatchResult, Metric,
    OperationStats, Query, Result,
};
use oddsim_similarity::{analyze, AggregateAnalysis, Forecast, Matcher, MatcherConfig, ScoreMemo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Threshold used for the side-by-side metric comparison
pub const COMPARE_THRESHOLD: f64 = 0.8;

/// One similarity request as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The five target prices, by display or stored name
    pub odds: Map<String, Value>,
    #[serde(default, alias = "metric")]
    pub method: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default, alias = "min_count")]
    pub min_matches: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub metric: Metric,
    pub threshold: f64,
    pub min_count: usize,
    /// At most `response_limit` matches, best first
    pub matches: Vec<MatchResult>,
    pub analysis: AggregateAnalysis,
    pub forecast: Forecast,
    pub cache_hit: bool,
}

/// Analysis of one metric within a comparison
#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub metric: Metric,
    pub analysis: AggregateAnalysis,
    pub forecast: Forecast,
}

/// Stops the maintenance thread when dropped
struct MaintenanceHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("maintenance thread panicked");
            }
        }
    }
}

/// Entry point for similarity analysis over the record store
pub struct AnalysisManager {
    config: EngineConfig,
    ctx: EngineContext,
    store: Arc<RecordStore>,
    cache: Arc<ResultCache>,
    matcher: Matcher,
    _maintenance: Option<MaintenanceHandle>,
}

impl AnalysisManager {
    /// In-memory manager
    pub fn new(config: EngineConfig, ctx: EngineContext) -> Result<Self> {
        Self::with_store(RecordStore::new(), config, ctx)
    }

    /// Manager over a durable store in `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P, config: EngineConfig, ctx: EngineContext) -> Result<Self> {
        let store = ctx.metrics.timed("store_open", || RecordStore::open(data_dir))?;
        Self::with_store(store, config, ctx)
    }

    fn with_store(store: RecordStore, config: EngineConfig, ctx: EngineContext) -> Result<Self> {
        config.validate()?;

        let mut matcher = Matcher::new(MatcherConfig::from(&config));
        if config.score_memo_capacity > 0 {
            matcher = matcher.with_memo(Arc::new(ScoreMemo::new(config.score_memo_capacity)));
        }

        let store = Arc::new(store);
        let cache = Arc::new(ResultCache::new(config.cache_ttl));
        let maintenance = config
            .maintenance_interval
            .map(|every| start_maintenance(every, store.clone(), cache.clone(), ctx.clone()));

        info!(
            metric = %config.default_metric,
            threshold = config.default_threshold,
            min_count = config.default_min_count,
            records = store.len(),
            durable = store.is_durable(),
            "analysis manager ready"
        );

        Ok(Self {
            config,
            ctx,
            store,
            cache,
            matcher,
            _maintenance: maintenance,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Validate request parameters and encode the target; no scan happens here
    pub fn build_query(&self, request: &AnalysisRequest) -> Result<Query> {
        let metric = match &request.method {
            Some(name) => name.parse::<Metric>()?,
            None => self.config.default_metric,
        };
        let threshold = request.threshold.unwrap_or(self.config.default_threshold);
        let min_count = request.min_matches.unwrap_or(self.config.default_min_count);
        let target = encode(&request.odds)?;
        Query::new(target, metric, threshold, min_count)
    }

    /// Full pipeline: match (through the cache), aggregate, forecast
    ///
    /// `timeout` overrides the configured request timeout. On expiry nothing
    /// is cached and `Error::Timeout` is returned.
    pub fn analyze(&self, request: &AnalysisRequest, timeout: Option<Duration>) -> Result<AnalysisResponse> {
        self.ctx.metrics.timed("analyze", || -> Result<AnalysisResponse> {
            let query = self.build_query(request)?;
            let deadline = Deadline::from_option(timeout.or(self.config.request_timeout));

            let (matches, cache_hit) = self.lookup(&query, &deadline)?;
            let analysis = self.ctx.metrics.timed("aggregate", || Ok::<_, Error>(analyze(&matches)))?;
            let forecast = Forecast::build(&analysis, &query.target);
            deadline.check()?;

            Ok(AnalysisResponse {
                metric: query.metric,
                threshold: query.threshold,
                min_count: query.min_count,
                matches: matches.iter().take(self.config.response_limit).cloned().collect(),
                analysis,
                forecast,
                cache_hit,
            })
        })
    }

    /// Cache-aware match list for a validated query
    pub fn find(&self, query: &Query, deadline: &Deadline) -> Result<Vec<MatchResult>> {
        let (matches, _) = self.lookup(query, deadline)?;
        Ok(matches.as_ref().clone())
    }

    fn lookup(&self, query: &Query, deadline: &Deadline) -> Result<(Arc<Vec<MatchResult>>, bool)> {
        let fingerprint = Fingerprint::of(query);
        if let Some(hit) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, age_ms = hit.age.as_millis() as u64, "cache hit");
            return Ok((hit.matches, true));
        }
        debug!(fingerprint = %fingerprint, "cache miss");

        let matches = self
            .ctx
            .metrics
            .timed("match", || self.matcher.find(self.store.as_ref(), query, deadline))?;
        deadline.check()?;

        let matches = Arc::new(matches);
        self.cache.put(fingerprint, Arc::clone(&matches));
        Ok((matches, false))
    }

    /// Analysis under every metric at [`COMPARE_THRESHOLD`]
    pub fn compare_metrics(
        &self,
        odds: &Map<String, Value>,
        min_count: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<Vec<MetricReport>> {
        self.ctx.metrics.timed("compare", || -> Result<Vec<MetricReport>> {
            let target = encode(odds)?;
            let min_count = min_count.unwrap_or(self.config.default_min_count);
            let deadline = Deadline::from_option(timeout.or(self.config.request_timeout));

            Metric::ALL
                .iter()
                .map(|&metric| -> Result<MetricReport> {
                    let query = Query::new(target, metric, COMPARE_THRESHOLD, min_count)?;
                    let (matches, _) = self.lookup(&query, &deadline)?;
                    let analysis = analyze(&matches);
                    let forecast = Forecast::build(&analysis, &target);
                    Ok(MetricReport {
                        metric,
                        analysis,
                        forecast,
                    })
                })
                .collect()
        })
    }

    /// Store writes do not invalidate cached results
    pub fn upsert(&self, record: HistoricalRecord) -> Result<UpsertOutcome> {
        self.ctx.metrics.timed("upsert", || self.store.upsert(record))
    }

    pub fn upsert_batch(&self, records: Vec<HistoricalRecord>) -> BatchReport {
        let start = Instant::now();
        let report = self.store.upsert_batch(records);
        self.ctx
            .metrics
            .record("upsert_batch", start.elapsed(), report.rejected.is_empty());
        report
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Returns the number of entries removed
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.invalidate_all();
        if let Some(memo) = self.matcher.memo() {
            memo.clear();
        }
        info!(removed, "result cache cleared");
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn compact(&self) -> Result<Option<SnapshotDescription>> {
        self.ctx.metrics.timed("compact", || self.store.compact())
    }

    pub fn metrics_snapshot(&self) -> Vec<(String, OperationStats)> {
        self.ctx.metrics.snapshot()
    }
}

fn start_maintenance(
    every: Duration,
    store: Arc<RecordStore>,
    cache: Arc<ResultCache>,
    ctx: EngineContext,
) -> MaintenanceHandle {
    let (stop, wake) = mpsc::channel::<()>();
    let spawned = std::thread::Builder::new()
        .name("oddsim-maintenance".to_string())
        .spawn(move || loop {
            match wake.recv_timeout(every) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "expired cache entries removed");
            }
            if store.is_durable() {
                if let Err(e) = ctx.metrics.timed("compact", || store.compact()) {
                    warn!("background compaction failed: {}", e);
                }
            }
        });

    match spawned {
        Ok(thread) => {
            info!(interval_secs = every.as_secs(), "maintenance thread started");
            MaintenanceHandle {
                stop: Some(stop),
                thread: Some(thread),
            }
        }
        Err(e) => {
            warn!("maintenance thread unavailable: {}", e);
            MaintenanceHandle {
                stop: None,
                thread: None,
            }
        }
    }
}
