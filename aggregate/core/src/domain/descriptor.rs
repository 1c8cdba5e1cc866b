// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request and manifest resource descriptors
//!
//! Clients describe the resources they want as a request descriptor; the
//! aggregate answers with a manifest rendering what was allocated. Both are
//! stored on slices and slivers as opaque text.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::domain::sliver::{AllocationState, ExecuteDirective, InstallDirective, OperationalState};
use crate::domain::stitching::StitchingReservation;
use crate::domain::urn::SliverUrn;

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestDescriptor {
    #[serde(default)]
    pub nodes: Vec<NodeRequest>,
    #[serde(default)]
    pub links: Vec<LinkRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRequest {
    pub client_id: String,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    /// Requested compute host, subject to backend placement
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub installs: Vec<InstallDirective>,
    #[serde(default)]
    pub executes: Vec<ExecuteDirective>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceRequest {
    pub client_id: String,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkRequest {
    pub client_id: String,
    /// Client ids of the interfaces this link connects
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub vlan_tag: Option<u16>,
    #[serde(default)]
    pub stitching: Option<StitchingReservation>,
}

impl RequestDescriptor {
    /// Structural checks: unique client ids, links referencing declared
    /// interfaces, and no interface on more than one link.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.nodes.is_empty() && self.links.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let mut ids = HashSet::new();
        let mut interfaces = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.client_id.as_str()) {
                return Err(DescriptorError::DuplicateClientId(node.client_id.clone()));
            }
            for nic in &node.interfaces {
                if !ids.insert(nic.client_id.as_str()) {
                    return Err(DescriptorError::DuplicateClientId(nic.client_id.clone()));
                }
                interfaces.insert(nic.client_id.as_str());
            }
        }

        let mut link_of: HashMap<&str, &str> = HashMap::new();
        for link in &self.links {
            if !ids.insert(link.client_id.as_str()) {
                return Err(DescriptorError::DuplicateClientId(link.client_id.clone()));
            }
            for nic in &link.interfaces {
                if !interfaces.contains(nic.as_str()) {
                    return Err(DescriptorError::UnknownInterface {
                        link: link.client_id.clone(),
                        interface: nic.clone(),
                    });
                }
                if let Some(other) = link_of.insert(nic.as_str(), link.client_id.as_str()) {
                    return Err(DescriptorError::InterfaceOnTwoLinks {
                        interface: nic.clone(),
                        first: other.to_string(),
                        second: link.client_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub trait DescriptorParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<RequestDescriptor, DescriptorError>;
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDescriptor {
    pub slice_urn: String,
    pub nodes: Vec<ManifestNode>,
    pub links: Vec<ManifestLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub client_id: String,
    pub sliver_urn: SliverUrn,
    pub allocation_status: AllocationState,
    pub operational_status: OperationalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgmt_address: Option<String>,
    pub interfaces: Vec<ManifestInterface>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInterface {
    pub client_id: String,
    pub sliver_urn: SliverUrn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLink {
    pub client_id: String,
    pub sliver_urn: SliverUrn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_tag: Option<u16>,
    pub interfaces: Vec<SliverUrn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stitching: Option<StitchingReservation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("Descriptor syntax error: {0}")]
    Syntax(String),

    #[error("Descriptor requests no resources")]
    Empty,

    #[error("Duplicate client id '{0}'")]
    DuplicateClientId(String),

    #[error("Link '{link}' references unknown interface '{interface}'")]
    UnknownInterface { link: String, interface: String },

    #[error("Interface '{interface}' is on both '{first}' and '{second}'")]
    InterfaceOnTwoLinks {
        interface: String,
        first: String,
        second: String,
    },

    #[error("Manifest rendering failed: {0}")]
    Render(String),
}
