use lens_domain::services::listing::ListingPolicy;
use lens_domain::services::micro_highs::MicroHighPolicy;
use lens_domain::services::reaction::ReactionPolicy;
use lens_domain::value_objects::duration::parse_duration_seconds;
use lens_domain::value_objects::reaction::Horizon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    pub exchange: String,
    /// Stop once this many reaction rows were recorded.
    pub target_rows: Option<usize>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub announcements_csv: String,
    pub out_csv: String,
    pub audit_jsonl: String,
    pub cache_db: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
    /// Overrides the exchange adapter's default API host.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub min_interval_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 20_000,
            user_agent: concat!("listing-lens/", env!("CARGO_PKG_VERSION")).to_string(),
            min_interval_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub max_total_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 6_000,
            max_total_attempts: 6,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct WindowConfig {
    pub horizons: Vec<String>,
    pub listing_lookback: String,
    pub minimum_lookback: String,
    pub boundary_tolerance: String,
    pub baseline_lookback: String,
    pub horizon_tolerance: String,
    /// Micro-highs are searched in `[t, t + micro_high_window]`.
    pub micro_high_window: String,
    pub lookahead_bars: usize,
    pub min_pullback_pct: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizons: ["5m", "15m", "60m", "240m"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            listing_lookback: "2h".to_string(),
            minimum_lookback: "1m".to_string(),
            boundary_tolerance: "10m".to_string(),
            baseline_lookback: "10m".to_string(),
            horizon_tolerance: "2m".to_string(),
            micro_high_window: "60m".to_string(),
            lookahead_bars: 4,
            min_pullback_pct: 0.0,
        }
    }
}

/// Validated, typed view of [`Config`] consumed by the dataset use case.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSettings {
    pub run_id: String,
    pub exchange: String,
    pub target_rows: Option<usize>,
    pub horizons: Vec<Horizon>,
    pub listing: ListingPolicy,
    pub reaction: ReactionPolicy,
    pub micro_highs: MicroHighPolicy,
}

impl DatasetSettings {
    pub fn max_horizon_seconds(&self) -> i64 {
        self.horizons.iter().map(Horizon::seconds).max().unwrap_or(0)
    }

    /// How far past the announcement the reaction series must reach.
    pub fn reaction_span_seconds(&self) -> i64 {
        (self.max_horizon_seconds() + self.reaction.horizon_tolerance_seconds)
            .max(self.micro_highs.window_seconds)
    }
}

/// Minutes before the announcement the pre-announcement mean reads.
const PRE_MEAN_SECONDS: i64 = 5 * 60;

fn window_seconds(field: &str, value: &str) -> Result<i64, String> {
    parse_duration_seconds(value).map_err(|err| format!("window.{field}: {err}"))
}

impl Config {
    pub fn validate(&self) -> Result<DatasetSettings, String> {
        if self.run.run_id.trim().is_empty() {
            return Err("run.run_id must not be empty".to_string());
        }
        if self.run.exchange.trim().is_empty() {
            return Err("run.exchange must not be empty".to_string());
        }
        if self.run.target_rows == Some(0) {
            return Err("run.target_rows must be greater than 0".to_string());
        }
        for (field, value) in [
            ("announcements_csv", &self.paths.announcements_csv),
            ("out_csv", &self.paths.out_csv),
            ("audit_jsonl", &self.paths.audit_jsonl),
            ("cache_db", &self.paths.cache_db),
        ] {
            if value.trim().is_empty() {
                return Err(format!("paths.{field} must not be empty"));
            }
        }
        if self.http.timeout_ms == 0 {
            return Err("http.timeout_ms must be greater than 0".to_string());
        }
        self.validate_retry()?;

        let window = &self.window;
        if window.horizons.is_empty() {
            return Err("window.horizons must list at least one horizon".to_string());
        }
        let mut horizons = Vec::with_capacity(window.horizons.len());
        let mut seen = BTreeSet::new();
        for label in &window.horizons {
            let horizon = Horizon::parse(label).map_err(|err| format!("window.horizons: {err}"))?;
            if !seen.insert(horizon) {
                return Err(format!("window.horizons: duplicate horizon {label}"));
            }
            horizons.push(horizon);
        }

        let listing = ListingPolicy {
            lookback_seconds: window_seconds("listing_lookback", &window.listing_lookback)?,
            minimum_lookback_seconds: window_seconds("minimum_lookback", &window.minimum_lookback)?,
            boundary_tolerance_seconds: window_seconds("boundary_tolerance", &window.boundary_tolerance)?,
        };
        if listing.lookback_seconds <= listing.minimum_lookback_seconds {
            return Err(format!(
                "window.listing_lookback ({}) must exceed window.minimum_lookback ({})",
                window.listing_lookback, window.minimum_lookback
            ));
        }
        if listing.lookback_seconds < PRE_MEAN_SECONDS {
            return Err(format!(
                "window.listing_lookback ({}) must cover the 5m before the announcement",
                window.listing_lookback
            ));
        }
        let reaction = ReactionPolicy {
            baseline_lookback_seconds: window_seconds("baseline_lookback", &window.baseline_lookback)?,
            horizon_tolerance_seconds: window_seconds("horizon_tolerance", &window.horizon_tolerance)?,
        };
        if reaction.baseline_lookback_seconds > listing.lookback_seconds {
            return Err(format!(
                "window.baseline_lookback ({}) must not exceed window.listing_lookback ({})",
                window.baseline_lookback, window.listing_lookback
            ));
        }
        let micro_highs = self.validate_micro_highs()?;

        Ok(DatasetSettings {
            run_id: self.run.run_id.trim().to_string(),
            exchange: self.run.exchange.trim().to_lowercase(),
            target_rows: self.run.target_rows,
            horizons,
            listing,
            reaction,
            micro_highs,
        })
    }

    fn validate_micro_highs(&self) -> Result<MicroHighPolicy, String> {
        let window = &self.window;
        let window_seconds = window_seconds("micro_high_window", &window.micro_high_window)?;
        if window_seconds <= 0 {
            return Err("window.micro_high_window must be positive".to_string());
        }
        if window.lookahead_bars == 0 {
            return Err("window.lookahead_bars must be at least 1".to_string());
        }
        if !window.min_pullback_pct.is_finite() || !(0.0..1.0).contains(&window.min_pullback_pct) {
            return Err("window.min_pullback_pct must be in [0, 1)".to_string());
        }
        Ok(MicroHighPolicy {
            window_seconds,
            lookahead_bars: window.lookahead_bars,
            min_pullback_pct: window.min_pullback_pct,
        })
    }

    fn validate_retry(&self) -> Result<(), String> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if retry.max_total_attempts < retry.max_attempts {
            return Err(format!(
                "retry.max_total_attempts ({}) must be >= retry.max_attempts ({})",
                retry.max_total_attempts, retry.max_attempts
            ));
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err("retry.backoff_multiplier must be a finite value >= 1.0".to_string());
        }
        if retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err("retry.max_backoff_ms must be >= retry.initial_backoff_ms".to_string());
        }
        Ok(())
    }

    /// Resolves relative paths against `base` (normally the config file's directory).
    pub fn resolve_path(base: Option<&Path>, value: &str) -> PathBuf {
        let path = PathBuf::from(value);
        match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}
