use lens_application::config::Config;
use lens_application::series::SeriesBuilder;
use lens_domain::value_objects::reaction::Horizon;
use lens_infrastructure::cache::SqliteResponseCache;
use lens_infrastructure::exchanges::adapter_for;
use lens_infrastructure::http::{HostPacer, RateLimitedFetcher, ReqwestTransport, RetryPolicy, SystemClock};
use lens_infrastructure::reporting::FilesystemDatasetSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Resolved output and input locations, relative to the config file.
pub struct RunPaths {
    pub announcements_csv: PathBuf,
    pub out_csv: PathBuf,
    pub audit_jsonl: PathBuf,
    pub cache_db: PathBuf,
}

pub fn resolve_paths(config: &Config, config_path: &Path) -> RunPaths {
    let base = config_path.parent();
    RunPaths {
        announcements_csv: Config::resolve_path(base, &config.paths.announcements_csv),
        out_csv: Config::resolve_path(base, &config.paths.out_csv),
        audit_jsonl: Config::resolve_path(base, &config.paths.audit_jsonl),
        cache_db: Config::resolve_path(base, &config.paths.cache_db),
    }
}

pub fn open_cache(path: &Path) -> Result<Arc<SqliteResponseCache>, String> {
    let cache = SqliteResponseCache::open(path)
        .map_err(|err| format!("failed to open cache {}: {err}", path.display()))?;
    Ok(Arc::new(cache))
}

fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.retry.max_attempts,
        initial_backoff: Duration::from_millis(config.retry.initial_backoff_ms),
        backoff_multiplier: config.retry.backoff_multiplier,
        max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
        max_total_attempts: config.retry.max_total_attempts,
    }
}

/// Wires cache, transport, pacing and the exchange adapter into one series builder.
pub fn build_series_builder(config: &Config, cache: Arc<SqliteResponseCache>) -> Result<SeriesBuilder, String> {
    let adapter = adapter_for(&config.run.exchange, config.http.base_url.as_deref())?;
    let transport = ReqwestTransport::new(config.http.timeout_ms, &config.http.user_agent)?;
    let clock = Arc::new(SystemClock);
    let pacer = Arc::new(HostPacer::new(
        Duration::from_millis(config.http.min_interval_ms),
        clock.clone(),
    ));
    let classifier = adapter.clone();
    let fetcher = RateLimitedFetcher::new(cache, Arc::new(transport), pacer, clock, retry_policy(config))
        .with_classifier(Arc::new(move |body: &[u8]| classifier.classify(body)));
    Ok(SeriesBuilder::new(Arc::new(fetcher), adapter))
}

pub fn create_sink(paths: &RunPaths, horizons: &[Horizon]) -> Result<FilesystemDatasetSink, String> {
    FilesystemDatasetSink::create(&paths.out_csv, &paths.audit_jsonl, horizons)
}
