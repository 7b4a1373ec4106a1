mod cache;
mod check;
mod common;
mod run;
mod validate;

use std::path::PathBuf;

pub enum Command {
    Run {
        config: PathBuf,
        metrics_addr: Option<String>,
    },
    ValidateConfig {
        config: PathBuf,
    },
    CheckListing {
        config: PathBuf,
        ticker: String,
        at: String,
    },
    Cache {
        config: PathBuf,
        action: CacheAction,
    },
}

pub enum CacheAction {
    Stats,
    Invalidate { fingerprint: String },
    Clear,
}

pub fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            config,
            metrics_addr,
        } => run::run_dataset(config, metrics_addr),
        Command::ValidateConfig { config } => validate::run_validate(config),
        Command::CheckListing { config, ticker, at } => check::run_check_listing(config, &ticker, &at),
        Command::Cache { config, action } => cache::run_cache(config, action),
    }
}
