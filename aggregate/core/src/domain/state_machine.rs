// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operational actions over provisioned slivers
//!
//! Batch actions are split into an evaluation step that records, per sliver,
//! whether the precondition holds, and an apply step. Both steps must run
//! while the caller holds the slice lock.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::slice::Slice;
use crate::domain::sliver::{AllocationState, OperationalState, Sliver, SliverStatus};
use crate::domain::urn::SliverUrn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalAction {
    Start,
    Restart,
    Stop,
}

impl OperationalAction {
    pub const ALL: [OperationalAction; 3] = [Self::Start, Self::Restart, Self::Stop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "geni_start",
            Self::Restart => "geni_restart",
            Self::Stop => "geni_stop",
        }
    }

    /// Operational state the sliver holds after the action
    pub fn target_state(&self) -> OperationalState {
        match self {
            Self::Start | Self::Restart => OperationalState::Ready,
            Self::Stop => OperationalState::NotReady,
        }
    }

    /// Evaluate the precondition of this action against one sliver
    pub fn check(&self, sliver: &Sliver, slice_shutdown: bool) -> Result<(), String> {
        if sliver.allocation_state() != AllocationState::Provisioned {
            return Err(format!(
                "{} requires a provisioned sliver, {} is {}",
                self.as_str(),
                sliver.urn(),
                sliver.allocation_state().as_str()
            ));
        }

        let operational = sliver.operational_state();
        match self {
            Self::Start | Self::Restart if slice_shutdown => Err(format!(
                "{} refused: slice of {} has been shut down",
                self.as_str(),
                sliver.urn()
            )),
            Self::Start if operational != OperationalState::NotReady => Err(format!(
                "{} requires {}, {} is {}",
                self.as_str(),
                OperationalState::NotReady.as_str(),
                sliver.urn(),
                operational.as_str()
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OperationalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalAction {
    type Err = ActionError;

    /// Accepts both `start` and `geni_start` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("geni_").unwrap_or(s);
        match name {
            "start" => Ok(Self::Start),
            "restart" => Ok(Self::Restart),
            "stop" => Ok(Self::Stop),
            _ => Err(ActionError::Unsupported(s.to_string())),
        }
    }
}

/// Result of evaluating an action over a set of slivers
#[derive(Debug, Clone)]
pub struct ActionPlan {
    action: OperationalAction,
    eligible: Vec<SliverUrn>,
    rejected: IndexMap<SliverUrn, String>,
    order: Vec<SliverUrn>,
}

impl ActionPlan {
    /// Check phase. Targets missing from the slice are recorded as rejected.
    pub fn evaluate(slice: &Slice, targets: &[SliverUrn], action: OperationalAction) -> Self {
        let mut eligible = Vec::new();
        let mut rejected = IndexMap::new();

        for urn in targets {
            let verdict = match slice.sliver(urn) {
                Some(sliver) => action.check(sliver, slice.is_shutdown()),
                None => Err(format!("sliver {} not found", urn)),
            };
            match verdict {
                Ok(()) => eligible.push(urn.clone()),
                Err(message) => {
                    rejected.insert(urn.clone(), message);
                }
            }
        }

        Self {
            action,
            eligible,
            rejected,
            order: targets.to_vec(),
        }
    }

    pub fn action(&self) -> OperationalAction {
        self.action
    }

    pub fn eligible(&self) -> &[SliverUrn] {
        &self.eligible
    }

    pub fn rejected(&self) -> &IndexMap<SliverUrn, String> {
        &self.rejected
    }

    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }

    /// Joined rejection messages, used when the whole batch is refused
    pub fn rejection_summary(&self) -> String {
        self.rejected
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Act phase. Transitions every eligible sliver and returns one status per
    /// target, rejected ones carrying their error message.
    pub fn apply(self, slice: &mut Slice) -> Result<Vec<SliverStatus>, ActionError> {
        let target = self.action.target_state();
        for urn in &self.eligible {
            let sliver = slice
                .sliver_mut(urn)
                .ok_or_else(|| ActionError::Vanished(urn.clone()))?;
            sliver
                .set_operational_state(target)
                .map_err(|e| ActionError::Transition(e.to_string()))?;
        }

        Ok(self
            .order
            .iter()
            .filter_map(|urn| {
                let error = self.rejected.get(urn).cloned().unwrap_or_default();
                slice.sliver(urn).map(|s| s.status_with_error(error))
            })
            .collect())
    }
}

/// Administrative stop: every provisioned sliver goes to NotReady and the
/// slice refuses further start/restart.
pub fn shutdown_slice(slice: &mut Slice) -> Vec<SliverStatus> {
    for sliver in slice.slivers_mut() {
        if sliver.allocation_state() == AllocationState::Provisioned {
            sliver.operational_state = OperationalState::NotReady;
        }
    }
    slice.mark_shutdown();
    slice.slivers().map(Sliver::status).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Unsupported operational action: {0}")]
    Unsupported(String),

    #[error("Sliver disappeared between check and apply: {0}")]
    Vanished(SliverUrn),

    #[error("{0}")]
    Transition(String),
}
