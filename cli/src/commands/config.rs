// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gram_core::domain::aggregate_config::AggregateConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./gram-config.yaml)
        #[arg(short, long, default_value = "./gram-config.yaml")]
        output: PathBuf,

        /// Write the annotated template instead of bare defaults
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = AggregateConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. GRAM_CONFIG_PATH: {}",
            std::env::var("GRAM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./gram-config.yaml");
        println!("  4. ~/.gram/config.yaml");
        println!("  5. /etc/gram/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Aggregate:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  URN: {}", config.aggregate_urn());
    println!("  Sliver authority: {}", config.spec.aggregate.urn_authority);
    println!();

    let lifecycle = &config.spec.lifecycle;
    println!("{}", "Lifecycle:".bold());
    println!(
        "  Allocation lifetime: {}",
        humanize(lifecycle.allocation_lifetime)
    );
    println!(
        "  Provision lifetime: {}",
        humanize(lifecycle.provision_lifetime)
    );
    println!(
        "  Renew may shorten: {}",
        lifecycle.renew_policy.allow_shorten
    );
    println!("  Max VMs per slice: {}", lifecycle.max_vms_per_slice);
    println!();

    let snapshots = &config.spec.snapshots;
    println!("{}", "Snapshots:".bold());
    match &snapshots.directory {
        Some(dir) => println!("  Directory: {}", dir.display()),
        None => println!("  Directory: {}", "(persistence disabled)".dimmed()),
    }
    println!("  Retention: {}", snapshots.retention);
    if let Some(name) = &snapshots.recover_from {
        println!("  Recover from: {}", name);
    } else {
        println!("  Recover most recent: {}", snapshots.recover_most_recent);
    }
    println!();

    println!("{}", "Backend:".bold());
    println!("  Hosts: {}", config.spec.backend.hosts.join(", "));
    println!("  Management prefix: {}.0/24", config.spec.backend.mgmt_prefix);
    for flavor in &config.spec.backend.flavors {
        println!(
            "    - {} ({} vCPU, {} MB, {} GB)",
            flavor.name.bold(),
            flavor.vcpus,
            flavor.memory_mb,
            flavor.disk_gb
        );
    }
    println!();

    println!("{}", "Network:".bold());
    println!(
        "  Listen: {}:{}",
        config.spec.network.bind_address, config.spec.network.port
    );
    match &config.spec.observability.metrics {
        Some(m) if m.enabled => println!("  Metrics port: {}", m.port),
        _ => println!("  Metrics: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = AggregateConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    if with_examples {
        std::fs::write(
            &output,
            include_str!("../../templates/gram-config-with-examples.yaml"),
        )
        .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        AggregateConfigManifest::default()
            .to_yaml_file(&output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn humanize(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}
