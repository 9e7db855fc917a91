use anyhow::Context;
use clap::Parser;
use oddsim_api::RestApi;
use oddsim_core::{EngineConfig, EngineContext, Metric};
use oddsim_storage::AnalysisManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Historical odds similarity server
#[derive(Parser, Debug)]
#[command(name = "oddsim")]
#[command(about = "Find past matches priced like a target and summarize their outcomes", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, env = "DATABASE_PATH", default_value = "./data")]
    data_dir: PathBuf,

    /// Keep records in memory only
    #[arg(long, env = "ODDSIM_IN_MEMORY")]
    in_memory: bool,

    /// HTTP API port
    #[arg(long, env = "ODDSIM_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// JSON engine configuration; the flags below override it
    #[arg(long, env = "ODDSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Default similarity metric (cosine, euclidean, percentage)
    #[arg(long, env = "ODDSIM_METRIC")]
    metric: Option<Metric>,

    /// Default similarity threshold in [0, 1]
    #[arg(long, env = "SIMILARITY_THRESHOLD")]
    threshold: Option<f64>,

    /// Default minimum number of matches returned
    #[arg(long, env = "MIN_SIMILAR_MATCHES")]
    min_matches: Option<usize>,

    /// Minimum record quality scanned by the matcher
    #[arg(long, env = "ODDSIM_MIN_QUALITY")]
    min_quality: Option<f64>,

    /// Result cache TTL in seconds
    #[arg(long, env = "ODDSIM_CACHE_TTL")]
    cache_ttl: Option<u64>,

    /// Scan worker threads
    #[arg(long, env = "ODDSIM_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Pairwise score memo capacity (0 disables it)
    #[arg(long, env = "ODDSIM_SCORE_MEMO")]
    score_memo: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "ODDSIM_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Cache purge and compaction interval in seconds
    #[arg(long, env = "ODDSIM_MAINTENANCE_INTERVAL")]
    maintenance_interval: Option<u64>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "ODDSIM_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };

        if let Some(metric) = self.metric {
            config.default_metric = metric;
        }
        if let Some(threshold) = self.threshold {
            config.default_threshold = threshold;
        }
        if let Some(min_matches) = self.min_matches {
            config.default_min_count = min_matches;
        }
        if let Some(min_quality) = self.min_quality {
            config.min_quality = min_quality;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        if let Some(capacity) = self.score_memo {
            config.score_memo_capacity = capacity;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(secs) = self.maintenance_interval {
            config.maintenance_interval = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting oddsim v{}", env!("CARGO_PKG_VERSION"));
    let config = args.engine_config()?;
    info!(
        metric = %config.default_metric,
        threshold = config.default_threshold,
        min_matches = config.default_min_count,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        workers = config.max_workers,
        "engine configured"
    );

    let ctx = EngineContext::new();
    let manager = if args.in_memory {
        info!("Records kept in memory only");
        AnalysisManager::new(config, ctx)?
    } else {
        info!("Data directory: {:?}", args.data_dir);
        AnalysisManager::open(&args.data_dir, config, ctx)?
    };
    let manager = Arc::new(manager);

    let manager_http = manager.clone();
    let http_port = args.http_port;
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(manager_http, http_port).await {
                error!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/", args.http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    if !args.in_memory {
        match manager.compact() {
            Ok(Some(snapshot)) => info!(records = snapshot.records, "final snapshot written"),
            Ok(None) => {}
            Err(e) => error!("final compaction failed: {}", e),
        }
    }

    info!("Shutting down...");
    Ok(())
}
