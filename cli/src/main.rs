// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # GRAM Aggregate Manager CLI
//!
//! The `gram` binary runs a testbed aggregate manager and maintains its
//! configuration and snapshots.
//!
//! ## Commands
//!
//! - `gram serve` - Run the aggregate manager with its HTTP API
//! - `gram config show|validate|generate` - Configuration management
//! - `gram snapshot list|inspect|prune` - Snapshot maintenance

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use gram::commands::{self, ConfigCommand, SnapshotCommand};
use gram::server::{self, ListenOverrides};
use gram_core::domain::aggregate_config::{AggregateConfigManifest, LoggingConfig};

/// GRAM Aggregate Manager - GENI AM API v3 resource lifecycle
#[derive(Parser)]
#[command(name = "gram")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GRAM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "GRAM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact or json); defaults to the configured format
    #[arg(long, global = true, env = "GRAM_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the aggregate manager
    #[command(name = "serve")]
    Serve {
        /// HTTP API host (default: spec.network.bind_address)
        #[arg(long, env = "GRAM_HOST")]
        host: Option<String>,

        /// HTTP API port (default: spec.network.port)
        #[arg(long, env = "GRAM_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Snapshot maintenance
    #[command(name = "snapshot")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            // Configuration is read first so its logging section applies
            let config = AggregateConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            init_logging(
                &config.spec.observability.logging,
                cli.log_level.as_deref(),
                cli.log_format.as_deref(),
            )?;
            server::start_server(config, ListenOverrides { host, port }).await
        }
        Some(Commands::Config { command }) => {
            init_logging(
                &LoggingConfig::default(),
                cli.log_level.as_deref().or(Some("warn")),
                cli.log_format.as_deref(),
            )?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Snapshot { command }) => {
            init_logging(
                &LoggingConfig::default(),
                cli.log_level.as_deref().or(Some("warn")),
                cli.log_format.as_deref(),
            )?;
            commands::snapshot::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging; `RUST_LOG` takes precedence
fn init_logging(
    logging: &LoggingConfig,
    level: Option<&str>,
    format: Option<&str>,
) -> Result<()> {
    let level = level.unwrap_or(&logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format.unwrap_or(&logging.format) {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
