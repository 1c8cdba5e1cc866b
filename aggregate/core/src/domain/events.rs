// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::state_machine::OperationalAction;
use crate::domain::urn::SliceUrn;

/// Slice lifecycle events published after each successful mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SliceEvent {
    SliceAllocated {
        slice_urn: SliceUrn,
        owner_urn: String,
        sliver_count: usize,
        expires_at: DateTime<Utc>,
        allocated_at: DateTime<Utc>,
    },
    SliceProvisioned {
        slice_urn: SliceUrn,
        sliver_count: usize,
        provisioned_at: DateTime<Utc>,
    },
    ActionPerformed {
        slice_urn: SliceUrn,
        action: OperationalAction,
        applied: usize,
        rejected: usize,
        performed_at: DateTime<Utc>,
    },
    SliceRenewed {
        slice_urn: SliceUrn,
        expires_at: DateTime<Utc>,
        renewed_at: DateTime<Utc>,
    },
    SliceShutDown {
        slice_urn: SliceUrn,
        shut_down_at: DateTime<Utc>,
    },
    SliceDeleted {
        slice_urn: SliceUrn,
        teardown_failures: usize,
        deleted_at: DateTime<Utc>,
    },
    SliceExpired {
        slice_urn: SliceUrn,
        expired_at: DateTime<Utc>,
    },
    SnapshotPersisted {
        name: String,
        record_count: usize,
        persisted_at: DateTime<Utc>,
    },
    SnapshotFailed {
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl SliceEvent {
    /// Slice the event concerns, if any
    pub fn slice_urn(&self) -> Option<&SliceUrn> {
        match self {
            Self::SliceAllocated { slice_urn, .. }
            | Self::SliceProvisioned { slice_urn, .. }
            | Self::ActionPerformed { slice_urn, .. }
            | Self::SliceRenewed { slice_urn, .. }
            | Self::SliceShutDown { slice_urn, .. }
            | Self::SliceDeleted { slice_urn, .. }
            | Self::SliceExpired { slice_urn, .. } => Some(slice_urn),
            Self::SnapshotPersisted { .. } | Self::SnapshotFailed { .. } => None,
        }
    }
}
