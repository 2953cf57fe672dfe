//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::{Context, Result};
use clap::Parser;
use pyra_core::config::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Path to an engine config file (JSON). Defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,
}

impl CommonArgs {
    /// Load the engine config, applying CLI overrides.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        if let Some(database) = &self.database {
            config.database_url = database.display().to_string();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Install the global tracing subscriber for a paper-trading process.
///
/// `--log-level` seeds the filter when `RUST_LOG` is unset. The JSON layer
/// feeds the platform's log shipper; the plain layer is for a terminal.
pub fn init_logging(args: &CommonArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

/// Print a manager summary
pub fn print_summary(summary: &pyra_core::engine::ManagerSummary) {
    tracing::info!("=== Session Summary ===");
    tracing::info!("Total sessions: {}", summary.total_sessions);
    tracing::info!("Active sessions: {}", summary.active_sessions);
    tracing::info!("Isolated fund (active): {:.4}", summary.total_isolated_fund);
    tracing::info!("Used fund (active): {:.4}", summary.total_used_fund);
    tracing::info!("Unrealized PnL: {:.4}", summary.total_unrealized_pnl);
}
