mod commands;
mod infra;
mod obs;

use clap::{Parser, Subcommand};
use commands::{CacheAction, Command};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "listing-lens")]
#[command(about = "Futures-listing reaction dataset builder", version, arg_required_else_help = true)]
#[command(
    after_help = "Examples:\n  listing-lens run --config configs/sample.toml\n  listing-lens validate-config --config configs/sample.toml\n  listing-lens check-listing --config configs/sample.toml --ticker PEPE --at 2024-05-01T12:00:00Z\n  listing-lens cache stats --config configs/sample.toml\n"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Build the reaction dataset for every announcement in the input CSV.
    Run {
        #[arg(long)]
        config: PathBuf,
        /// Prometheus metrics listen addr (e.g. 127.0.0.1:9898). Optional.
        #[arg(long)]
        metrics_addr: Option<String>,
    },
    ValidateConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Check whether a ticker was already trading on the target exchange.
    CheckListing {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        ticker: String,
        /// Announcement time, RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC).
        #[arg(long)]
        at: String,
    },
    /// Inspect or prune the HTTP response cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    Stats {
        #[arg(long)]
        config: PathBuf,
    },
    Invalidate {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        fingerprint: String,
    },
    Clear {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = match cli.command {
        CliCommand::Run {
            config,
            metrics_addr,
        } => Command::Run {
            config,
            metrics_addr,
        },
        CliCommand::ValidateConfig { config } => Command::ValidateConfig { config },
        CliCommand::CheckListing { config, ticker, at } => Command::CheckListing { config, ticker, at },
        CliCommand::Cache { action } => match action {
            CacheCommand::Stats { config } => Command::Cache {
                config,
                action: CacheAction::Stats,
            },
            CacheCommand::Invalidate {
                config,
                fingerprint,
            } => Command::Cache {
                config,
                action: CacheAction::Invalidate { fingerprint },
            },
            CacheCommand::Clear { config } => Command::Cache {
                config,
                action: CacheAction::Clear,
            },
        },
    };

    if let Err(err) = commands::run(command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
