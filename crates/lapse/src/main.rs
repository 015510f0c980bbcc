//! Lapse - command-line harness for the TTL session store.
//!
//! Main entry point for the `lapse` CLI.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use lapse_session::StoreConfig;

mod commands;

use commands::{demo, stress};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Lapse - in-memory sessions that expire after their last update
#[derive(Parser)]
#[command(name = "lapse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "LAPSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session TTL in milliseconds (overrides the config file)
    #[arg(long, global = true, env = "LAPSE_TTL_MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_ms: Option<u64>,

    /// Also write JSON logs to a daily-rotated file in this directory
    #[arg(long, global = true, env = "LAPSE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk one session through create, renew, read, and expiry
    Demo(demo::DemoArgs),

    /// Hammer one store with concurrent sessions and renewals
    Stress(stress::StressArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "lapse=debug,lapse_session=debug,info"
    } else {
        "lapse=info,lapse_session=info,warn"
    };

    use tracing_subscriber::prelude::*;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    // Keep the guard alive so buffered file logs flush on exit.
    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "lapse.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "lapse=trace,lapse_session=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    let config = resolve_config(cli.config.as_deref(), cli.ttl_ms)?;
    tracing::debug!(ttl_ms = commands::millis(config.ttl), "Resolved store config");

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Demo(args) => demo::run(args, &ctx).await,
        Commands::Stress(args) => stress::run(args, &ctx).await,
    }
}

/// Layer the config file (if any) under the `--ttl-ms` override.
fn resolve_config(path: Option<&std::path::Path>, ttl_ms: Option<u64>) -> Result<StoreConfig> {
    let mut config = match path {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StoreConfig::default(),
    };

    if let Some(ms) = ttl_ms {
        config = config.with_ttl(Duration::from_millis(ms));
    }

    Ok(config)
}
