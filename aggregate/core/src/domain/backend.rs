// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Compute backend interface
//!
//! The driver that actually creates VMs and virtual networks. Calls are
//! treated as slow and may fail; failures surface as `BackendFailure`.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::slice::Slice;
use crate::domain::sliver::OperationalState;
use crate::domain::urn::SliverUrn;

/// Account descriptor forwarded from `geni_users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub urn: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Machine size class advertised by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    pub vcpus: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmAssignment {
    pub host: String,
    pub mgmt_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAssignment {
    pub mac_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAssignment {
    pub network_uuid: String,
    pub subnet_uuid: String,
}

/// Addressing handed back by the backend after provisioning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub vms: IndexMap<SliverUrn, VmAssignment>,
    pub interfaces: IndexMap<SliverUrn, InterfaceAssignment>,
    pub links: IndexMap<SliverUrn, LinkAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub sliver: SliverUrn,
    pub reason: String,
}

/// Outcome of tearing down a slice. Teardown continues past individual
/// failures, which are collected here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure_for(&self, sliver: &SliverUrn) -> Option<&str> {
        self.failures
            .iter()
            .find(|f| &f.sliver == sliver)
            .map(|f| f.reason.as_str())
    }
}

#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Create backend resources for the given allocated slivers of `slice`
    async fn provision_resources(
        &self,
        slice: &Slice,
        slivers: &[SliverUrn],
        users: &[UserAccount],
    ) -> Result<ProvisioningReport, BackendError>;

    /// Current operational state of every provisioned sliver the backend knows
    async fn update_operational_status(
        &self,
        slice: &Slice,
    ) -> Result<IndexMap<SliverUrn, OperationalState>, BackendError>;

    async fn delete_all_resources_for_slice(&self, slice: &Slice) -> TeardownReport;

    async fn list_flavors(&self) -> Result<Vec<Flavor>, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Provisioning failed for {sliver}: {reason}")]
    ProvisioningFailed { sliver: SliverUrn, reason: String },

    #[error("Unknown flavor '{0}'")]
    UnknownFlavor(String),

    #[error("No compute host available")]
    NoHostAvailable,
}
