// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Startup recovery from a persisted snapshot

use indexmap::IndexMap;
use tracing::info;

use crate::domain::aggregate_config::SnapshotConfig;
use crate::domain::slice::Slice;
use crate::domain::snapshot::{self, SnapshotError, SnapshotStore};
use crate::domain::stitching::StitchingService;
use crate::domain::urn::SliceUrn;

#[derive(Debug, Default)]
pub struct RecoveredState {
    pub slices: IndexMap<SliceUrn, Slice>,
    /// Snapshot the state was read from, if any
    pub source: Option<String>,
}

/// Load the explicitly named snapshot, or the most recent one when enabled,
/// then prune the store down to the retention limit.
pub fn recover(
    store: &dyn SnapshotStore,
    config: &SnapshotConfig,
    stitching: &dyn StitchingService,
) -> Result<RecoveredState, SnapshotError> {
    let source = match &config.recover_from {
        Some(name) => Some(name.clone()),
        None if config.recover_most_recent => store.latest()?.map(|info| info.name),
        None => None,
    };

    let slices = match &source {
        Some(name) => {
            let records = store.load(name)?;
            let record_count = records.len();
            let slices = snapshot::decode(records, stitching)?;
            info!(
                snapshot = %name,
                records = record_count,
                slices = slices.len(),
                "Recovered aggregate state from snapshot"
            );
            slices
        }
        None => {
            info!("Starting with an empty registry");
            IndexMap::new()
        }
    };

    store.prune(config.retention)?;
    Ok(RecoveredState { slices, source })
}
