// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot maintenance commands
//!
//! Commands: list, inspect, prune

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gram_core::domain::aggregate_config::AggregateConfigManifest;
use gram_core::domain::snapshot::{SnapshotRecord, SnapshotStore};
use gram_core::infrastructure::snapshot_store::FileSnapshotStore;

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// List snapshots, newest first
    List {
        /// Snapshot directory (default: spec.snapshots.directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Summarize the contents of one snapshot
    Inspect {
        /// Snapshot file name or path
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all but the most recent snapshots
    Prune {
        /// Snapshots to keep (default: spec.snapshots.retention)
        #[arg(long)]
        keep: Option<usize>,

        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: SnapshotCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let config = AggregateConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    match command {
        SnapshotCommand::List { dir } => list(&open_store(dir, &config)?),
        SnapshotCommand::Inspect { name, dir, json } => {
            inspect(&open_store(dir, &config)?, &name, json)
        }
        SnapshotCommand::Prune { keep, dir } => prune(
            &open_store(dir, &config)?,
            keep.unwrap_or(config.spec.snapshots.retention),
        ),
    }
}

fn open_store(dir: Option<PathBuf>, config: &AggregateConfigManifest) -> Result<FileSnapshotStore> {
    let dir = dir
        .or_else(|| config.spec.snapshots.directory.clone())
        .context("No snapshot directory: pass --dir or set spec.snapshots.directory")?;
    FileSnapshotStore::open(&dir)
        .with_context(|| format!("Failed to open snapshot directory {:?}", dir))
}

fn list(store: &FileSnapshotStore) -> Result<()> {
    let snapshots = store.list().context("Failed to list snapshots")?;
    if snapshots.is_empty() {
        println!(
            "{}",
            format!("No snapshots in {}", store.directory().display()).yellow()
        );
        return Ok(());
    }

    println!("{}", format!("Snapshots in {}:", store.directory().display()).bold());
    for info in snapshots {
        println!(
            "  {}  {}  {} bytes",
            info.name.bold(),
            info.modified.format("%Y-%m-%d %H:%M:%S"),
            info.size_bytes
        );
    }
    Ok(())
}

fn inspect(store: &FileSnapshotStore, name: &str, json: bool) -> Result<()> {
    let records = store
        .load(name)
        .with_context(|| format!("Failed to load snapshot {}", name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let summary = RecordSummary::of(&records);
    println!("{}", format!("Snapshot {}:", name).bold());
    println!("  Slices: {}", summary.slices);
    println!("  VMs: {}", summary.vms);
    println!("  Interfaces: {}", summary.interfaces);
    println!("  Links: {}", summary.links);
    println!();

    for record in &records {
        if let SnapshotRecord::Slice(slice) = record {
            let state = if slice.shutdown {
                "shut down".red()
            } else {
                "active".green()
            };
            println!("  {} ({})", slice.slice_urn.to_string().bold(), state);
            println!("    Owner: {}", slice.user_urn);
            println!("    Slivers: {}", slice.slivers.len());
            println!("    Expires: {}", slice.expiration.to_rfc3339());
        }
    }
    Ok(())
}

fn prune(store: &FileSnapshotStore, keep: usize) -> Result<()> {
    let removed = store.prune(keep).context("Failed to prune snapshots")?;
    for info in &removed {
        println!("  removed {}", info.name.dimmed());
    }
    println!(
        "{}",
        format!("✓ Kept {} most recent, removed {}", keep, removed.len()).green()
    );
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RecordSummary {
    slices: usize,
    vms: usize,
    interfaces: usize,
    links: usize,
}

impl RecordSummary {
    fn of(records: &[SnapshotRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, record| {
            match record {
                SnapshotRecord::Slice(_) => acc.slices += 1,
                SnapshotRecord::VirtualMachine(_) => acc.vms += 1,
                SnapshotRecord::NetworkInterface(_) => acc.interfaces += 1,
                SnapshotRecord::NetworkLink(_) => acc.links += 1,
            }
            acc
        })
    }
}
