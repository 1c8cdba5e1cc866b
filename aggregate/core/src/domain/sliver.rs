// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::urn::{SliceUrn, SliverType, SliverUrn};

// ============================================================================
// Value Objects
// ============================================================================

/// Allocation axis of the sliver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationState {
    #[serde(rename = "geni_unallocated")]
    Unallocated,
    #[serde(rename = "geni_allocated")]
    Allocated,
    #[serde(rename = "geni_provisioned")]
    Provisioned,
}

impl AllocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unallocated => "geni_unallocated",
            Self::Allocated => "geni_allocated",
            Self::Provisioned => "geni_provisioned",
        }
    }
}

/// Operational axis of the sliver state machine.
///
/// `PendingAllocation` is the inactive value held while the sliver is not
/// yet provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalState {
    #[serde(rename = "geni_pending_allocation")]
    PendingAllocation,
    #[serde(rename = "geni_notready")]
    NotReady,
    #[serde(rename = "geni_ready")]
    Ready,
}

impl OperationalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAllocation => "geni_pending_allocation",
            Self::NotReady => "geni_notready",
            Self::Ready => "geni_ready",
        }
    }

    /// Whether this operational state can be held under the given allocation state
    pub fn is_valid_for(&self, allocation: AllocationState) -> bool {
        match allocation {
            AllocationState::Provisioned => matches!(self, Self::NotReady | Self::Ready),
            _ => matches!(self, Self::PendingAllocation),
        }
    }
}

/// Software install applied to a VM at provisioning time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallDirective {
    pub source_url: String,
    pub install_path: String,
}

/// Command executed on a VM at provisioning time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteDirective {
    #[serde(default = "default_shell")]
    pub shell: String,
    pub command: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

/// Per-sliver status entry returned by Describe, Status and the batch operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverStatus {
    pub geni_sliver_urn: SliverUrn,
    pub geni_expires: DateTime<Utc>,
    pub geni_allocation_status: AllocationState,
    pub geni_operational_status: OperationalState,
    pub geni_error: String,
}

// ============================================================================
// Sliver Variants
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualMachine {
    pub host: Option<String>,
    pub os_image: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub flavor: Option<String>,
    pub mgmt_address: Option<String>,
    pub installs: Vec<InstallDirective>,
    pub executes: Vec<ExecuteDirective>,
    /// Host part of every data-plane address given to this VM
    pub last_octet: u8,
    pub(crate) interfaces: Vec<SliverUrn>,
}

impl VirtualMachine {
    pub fn interfaces(&self) -> &[SliverUrn] {
        &self.interfaces
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInterface {
    pub device_number: u32,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub vlan_tag: Option<u16>,
    pub(crate) virtual_machine: Option<SliverUrn>,
    pub(crate) link: Option<SliverUrn>,
}

impl NetworkInterface {
    /// Owning VM (lookup only, the slice owns both)
    pub fn virtual_machine(&self) -> Option<&SliverUrn> {
        self.virtual_machine.as_ref()
    }

    /// Link this interface terminates on
    pub fn link(&self) -> Option<&SliverUrn> {
        self.link.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkLink {
    pub subnet: Option<String>,
    pub vlan_tag: Option<u16>,
    pub network_uuid: Option<String>,
    pub subnet_uuid: Option<String>,
    pub(crate) endpoints: Vec<SliverUrn>,
}

impl NetworkLink {
    pub fn endpoints(&self) -> &[SliverUrn] {
        &self.endpoints
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliverKind {
    VirtualMachine(VirtualMachine),
    NetworkInterface(NetworkInterface),
    NetworkLink(NetworkLink),
}

impl SliverKind {
    pub fn sliver_type(&self) -> SliverType {
        match self {
            Self::VirtualMachine(_) => SliverType::VirtualMachine,
            Self::NetworkInterface(_) => SliverType::NetworkInterface,
            Self::NetworkLink(_) => SliverType::NetworkLink,
        }
    }
}

// ============================================================================
// Entity
// ============================================================================

/// One concrete resource held by a slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sliver {
    pub(crate) urn: SliverUrn,
    pub name: String,
    pub uuid: Uuid,
    pub(crate) slice_urn: SliceUrn,
    pub user_urn: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub(crate) allocation_state: AllocationState,
    pub(crate) operational_state: OperationalState,
    pub request: Option<String>,
    pub manifest: Option<String>,
    pub(crate) kind: SliverKind,
}

impl Sliver {
    /// Create a fresh, unallocated sliver
    pub fn new(
        urn: SliverUrn,
        uuid: Uuid,
        name: impl Into<String>,
        slice_urn: SliceUrn,
        user_urn: impl Into<String>,
        kind: SliverKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            urn,
            name: name.into(),
            uuid,
            slice_urn,
            user_urn: user_urn.into(),
            created_at: now,
            expires_at: now,
            allocation_state: AllocationState::Unallocated,
            operational_state: OperationalState::PendingAllocation,
            request: None,
            manifest: None,
            kind,
        }
    }

    pub fn urn(&self) -> &SliverUrn {
        &self.urn
    }

    pub fn slice_urn(&self) -> &SliceUrn {
        &self.slice_urn
    }

    pub fn allocation_state(&self) -> AllocationState {
        self.allocation_state
    }

    pub fn operational_state(&self) -> OperationalState {
        self.operational_state
    }

    pub fn kind(&self) -> &SliverKind {
        &self.kind
    }

    pub fn sliver_type(&self) -> SliverType {
        self.kind.sliver_type()
    }

    pub fn as_vm(&self) -> Option<&VirtualMachine> {
        match &self.kind {
            SliverKind::VirtualMachine(vm) => Some(vm),
            _ => None,
        }
    }

    pub fn as_vm_mut(&mut self) -> Option<&mut VirtualMachine> {
        match &mut self.kind {
            SliverKind::VirtualMachine(vm) => Some(vm),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&NetworkInterface> {
        match &self.kind {
            SliverKind::NetworkInterface(nic) => Some(nic),
            _ => None,
        }
    }

    pub fn as_interface_mut(&mut self) -> Option<&mut NetworkInterface> {
        match &mut self.kind {
            SliverKind::NetworkInterface(nic) => Some(nic),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&NetworkLink> {
        match &self.kind {
            SliverKind::NetworkLink(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_link_mut(&mut self) -> Option<&mut NetworkLink> {
        match &mut self.kind {
            SliverKind::NetworkLink(link) => Some(link),
            _ => None,
        }
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Unallocated -> Allocated
    pub fn mark_allocated(&mut self) -> Result<(), SliverError> {
        if self.allocation_state != AllocationState::Unallocated {
            return Err(self.invalid_transition(AllocationState::Allocated.as_str()));
        }
        self.allocation_state = AllocationState::Allocated;
        Ok(())
    }

    /// Allocated -> Provisioned. The sliver enters the NotReady operational state.
    pub fn mark_provisioned(&mut self) -> Result<(), SliverError> {
        if self.allocation_state != AllocationState::Allocated {
            return Err(self.invalid_transition(AllocationState::Provisioned.as_str()));
        }
        self.allocation_state = AllocationState::Provisioned;
        self.operational_state = OperationalState::NotReady;
        Ok(())
    }

    /// Move between NotReady and Ready. Only valid while Provisioned.
    pub(crate) fn set_operational_state(
        &mut self,
        state: OperationalState,
    ) -> Result<(), SliverError> {
        if !state.is_valid_for(self.allocation_state) || state == OperationalState::PendingAllocation {
            return Err(self.invalid_transition(state.as_str()));
        }
        self.operational_state = state;
        Ok(())
    }

    /// Check a restored (allocation, operational) pair
    pub(crate) fn validate_states(
        allocation: AllocationState,
        operational: OperationalState,
    ) -> Result<(), SliverError> {
        if operational.is_valid_for(allocation) {
            Ok(())
        } else {
            Err(SliverError::InconsistentState {
                allocation: allocation.as_str(),
                operational: operational.as_str(),
            })
        }
    }

    pub fn status(&self) -> SliverStatus {
        self.status_with_error("")
    }

    pub fn status_with_error(&self, error: impl Into<String>) -> SliverStatus {
        SliverStatus {
            geni_sliver_urn: self.urn.clone(),
            geni_expires: self.expires_at,
            geni_allocation_status: self.allocation_state,
            geni_operational_status: self.operational_state,
            geni_error: error.into(),
        }
    }

    fn invalid_transition(&self, to: &'static str) -> SliverError {
        SliverError::InvalidStateTransition {
            sliver: self.urn.clone(),
            from: format!(
                "{}/{}",
                self.allocation_state.as_str(),
                self.operational_state.as_str()
            ),
            to,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliverError {
    #[error("Invalid state transition for {sliver}: {from} -> {to}")]
    InvalidStateTransition {
        sliver: SliverUrn,
        from: String,
        to: &'static str,
    },

    #[error("Operational state {operational} is not valid while {allocation}")]
    InconsistentState {
        allocation: &'static str,
        operational: &'static str,
    },
}
