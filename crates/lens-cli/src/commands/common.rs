use crate::infra::RunPaths;
use lens_application::config::{load_config, Config, DatasetSettings};
use std::path::Path;

pub(super) fn engine_name() -> String {
    format!(
        "listing-lens {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("LENS_GIT_SHA")
    )
}

/// Loads and validates the config, then brings up logging from its `[run]` section.
pub(super) fn load_settings(config_path: &Path) -> Result<(Config, DatasetSettings), String> {
    let config = load_config(config_path)?;
    let settings = config
        .validate()
        .map_err(|err| format!("invalid config {}: {err}", config_path.display()))?;
    crate::obs::init_tracing(config.run.log_level.as_deref(), config.run.log_format)?;
    Ok((config, settings))
}

pub(super) fn print_config_summary(command: &str, config: &Config, settings: &DatasetSettings, paths: &RunPaths) {
    println!(
        "{} cli: {} (run_id={}, exchange={}, target_rows={})",
        engine_name(),
        command,
        settings.run_id,
        settings.exchange,
        settings
            .target_rows
            .map_or_else(|| "all".to_string(), |n| n.to_string())
    );
    println!(
        "paths: announcements={}, out_csv={}, audit={}, cache={}",
        paths.announcements_csv.display(),
        paths.out_csv.display(),
        paths.audit_jsonl.display(),
        paths.cache_db.display()
    );
    println!(
        "http: base_url={}, timeout_ms={}, min_interval_ms={}",
        config.http.base_url.as_deref().unwrap_or("default"),
        config.http.timeout_ms,
        config.http.min_interval_ms
    );
    println!(
        "retry: max_attempts={}, initial_backoff_ms={}, multiplier={}, max_backoff_ms={}, max_total_attempts={}",
        config.retry.max_attempts,
        config.retry.initial_backoff_ms,
        config.retry.backoff_multiplier,
        config.retry.max_backoff_ms,
        config.retry.max_total_attempts
    );
    println!(
        "window: horizons=[{}], listing_lookback={}s, minimum_lookback={}s, boundary_tolerance={}s, baseline_lookback={}s, horizon_tolerance={}s",
        settings
            .horizons
            .iter()
            .map(|h| h.label())
            .collect::<Vec<_>>()
            .join(","),
        settings.listing.lookback_seconds,
        settings.listing.minimum_lookback_seconds,
        settings.listing.boundary_tolerance_seconds,
        settings.reaction.baseline_lookback_seconds,
        settings.reaction.horizon_tolerance_seconds
    );
}
