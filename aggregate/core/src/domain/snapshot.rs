// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Snapshot record schema and codec
//!
//! A snapshot is a flat, ordered JSON array of tagged records: every slice
//! first, then every sliver of every slice. Relationships are stored as URNs.
//!
//! Decoding runs in two passes. Materialize builds unwired entities and side
//! tables of pending references; resolve adds slivers to their slices, wires
//! VM/interface/link references through the slice ownership operations,
//! verifies both ends agree, then reinstalls stitching reservations.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::slice::{GraphError, Slice};
use crate::domain::sliver::{
    AllocationState, ExecuteDirective, InstallDirective, NetworkInterface, NetworkLink,
    OperationalState, Sliver, SliverError, SliverKind, VirtualMachine,
};
use crate::domain::stitching::{StitchingError, StitchingReservation, StitchingService};
use crate::domain::urn::{SliceUrn, SliverUrn};

// ============================================================================
// Record Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotRecord {
    Slice(SliceRecord),
    VirtualMachine(VirtualMachineRecord),
    NetworkInterface(NetworkInterfaceRecord),
    NetworkLink(NetworkLinkRecord),
}

impl SnapshotRecord {
    /// URN of the entity the record describes
    pub fn urn(&self) -> &str {
        match self {
            Self::Slice(r) => r.slice_urn.as_str(),
            Self::VirtualMachine(r) => r.sliver.sliver_urn.as_str(),
            Self::NetworkInterface(r) => r.sliver.sliver_urn.as_str(),
            Self::NetworkLink(r) => r.sliver.sliver_urn.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRecord {
    pub slice_urn: SliceUrn,
    pub user_urn: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_uuid: Option<String>,
    #[serde(default)]
    pub controller_url: Option<String>,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub request_rspec: Option<String>,
    #[serde(default)]
    pub manifest_rspec: Option<String>,
    pub last_subnet_assigned: u32,
    pub next_vm_num: u32,
    #[serde(default)]
    pub shutdown: bool,
    pub slivers: Vec<SliverUrn>,
}

/// Attributes shared by every sliver record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliverHeader {
    pub sliver_urn: SliverUrn,
    pub name: String,
    pub uuid: Uuid,
    pub slice_urn: SliceUrn,
    pub user_urn: String,
    pub creation: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub allocation_state: AllocationState,
    pub operational_state: OperationalState,
    #[serde(default)]
    pub request_rspec: Option<String>,
    #[serde(default)]
    pub manifest_rspec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineRecord {
    #[serde(flatten)]
    pub sliver: SliverHeader,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub os_image: Option<String>,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub mgmt_address: Option<String>,
    #[serde(default)]
    pub installs: Vec<InstallDirective>,
    #[serde(default)]
    pub executes: Vec<ExecuteDirective>,
    pub last_octet: u8,
    #[serde(default)]
    pub interfaces: Vec<SliverUrn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceRecord {
    #[serde(flatten)]
    pub sliver: SliverHeader,
    pub device_number: u32,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub vlan_tag: Option<u16>,
    #[serde(default)]
    pub virtual_machine: Option<SliverUrn>,
    #[serde(default)]
    pub link: Option<SliverUrn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLinkRecord {
    #[serde(flatten)]
    pub sliver: SliverHeader,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub vlan_tag: Option<u16>,
    #[serde(default)]
    pub network_uuid: Option<String>,
    #[serde(default)]
    pub subnet_uuid: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<SliverUrn>,
    #[serde(default)]
    pub stitching: Option<StitchingReservation>,
}

// ============================================================================
// Encode
// ============================================================================

/// Flatten slices into records: all slices, then all slivers
pub fn encode(slices: &[Slice], stitching: &dyn StitchingService) -> Vec<SnapshotRecord> {
    let mut records: Vec<SnapshotRecord> = slices
        .iter()
        .map(|slice| {
            SnapshotRecord::Slice(SliceRecord {
                slice_urn: slice.urn().clone(),
                user_urn: slice.user_urn.clone(),
                tenant_name: slice.tenant_name.clone(),
                tenant_uuid: slice.tenant_uuid.clone(),
                controller_url: slice.controller_url.clone(),
                expiration: slice.expires_at,
                request_rspec: slice.request.clone(),
                manifest_rspec: slice.manifest.clone(),
                last_subnet_assigned: slice.last_subnet_assigned,
                next_vm_num: slice.next_vm_num,
                shutdown: slice.shutdown,
                slivers: slice.sliver_urns(),
            })
        })
        .collect();

    for slice in slices {
        records.extend(slice.slivers().map(|s| encode_sliver(s, stitching)));
    }
    records
}

fn encode_sliver(sliver: &Sliver, stitching: &dyn StitchingService) -> SnapshotRecord {
    let header = SliverHeader {
        sliver_urn: sliver.urn().clone(),
        name: sliver.name.clone(),
        uuid: sliver.uuid,
        slice_urn: sliver.slice_urn().clone(),
        user_urn: sliver.user_urn.clone(),
        creation: sliver.created_at,
        expiration: sliver.expires_at,
        allocation_state: sliver.allocation_state(),
        operational_state: sliver.operational_state(),
        request_rspec: sliver.request.clone(),
        manifest_rspec: sliver.manifest.clone(),
    };

    match sliver.kind() {
        SliverKind::VirtualMachine(vm) => SnapshotRecord::VirtualMachine(VirtualMachineRecord {
            sliver: header,
            host: vm.host.clone(),
            os_image: vm.os_image.clone(),
            os_type: vm.os_type.clone(),
            os_version: vm.os_version.clone(),
            flavor: vm.flavor.clone(),
            mgmt_address: vm.mgmt_address.clone(),
            installs: vm.installs.clone(),
            executes: vm.executes.clone(),
            last_octet: vm.last_octet,
            interfaces: vm.interfaces.clone(),
        }),
        SliverKind::NetworkInterface(nic) => {
            SnapshotRecord::NetworkInterface(NetworkInterfaceRecord {
                sliver: header,
                device_number: nic.device_number,
                mac_address: nic.mac_address.clone(),
                ip_address: nic.ip_address.clone(),
                vlan_tag: nic.vlan_tag,
                virtual_machine: nic.virtual_machine.clone(),
                link: nic.link.clone(),
            })
        }
        SliverKind::NetworkLink(link) => SnapshotRecord::NetworkLink(NetworkLinkRecord {
            sliver: header,
            subnet: link.subnet.clone(),
            vlan_tag: link.vlan_tag,
            network_uuid: link.network_uuid.clone(),
            subnet_uuid: link.subnet_uuid.clone(),
            endpoints: link.endpoints.clone(),
            stitching: stitching.lookup_reservation(sliver.urn()),
        }),
    }
}

pub fn to_json(records: &[SnapshotRecord]) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn from_json(text: &str) -> Result<Vec<SnapshotRecord>, SnapshotError> {
    Ok(serde_json::from_str(text)?)
}

// ============================================================================
// Decode
// ============================================================================

#[derive(Default)]
struct SnapshotDecoder {
    slices: IndexMap<SliceUrn, (Slice, Vec<SliverUrn>)>,
    slivers: IndexMap<SliverUrn, Sliver>,
    vm_interfaces: Vec<(SliverUrn, Vec<SliverUrn>)>,
    link_endpoints: Vec<(SliverUrn, Vec<SliverUrn>)>,
    interface_refs: HashMap<SliverUrn, (Option<SliverUrn>, Option<SliverUrn>)>,
    reservations: Vec<(SliverUrn, StitchingReservation)>,
}

impl SnapshotDecoder {
    fn materialize(&mut self, record: SnapshotRecord) -> Result<(), SnapshotError> {
        match record {
            SnapshotRecord::Slice(r) => {
                if self.slices.contains_key(&r.slice_urn) {
                    return Err(SnapshotError::DuplicateRecord(r.slice_urn.to_string()));
                }
                let mut slice = Slice::new(r.slice_urn.clone(), r.user_urn);
                slice.tenant_name = r.tenant_name;
                slice.tenant_uuid = r.tenant_uuid;
                slice.controller_url = r.controller_url;
                slice.expires_at = r.expiration;
                slice.request = r.request_rspec;
                slice.manifest = r.manifest_rspec;
                slice.last_subnet_assigned = r.last_subnet_assigned;
                slice.next_vm_num = r.next_vm_num;
                slice.shutdown = r.shutdown;
                self.slices.insert(r.slice_urn, (slice, r.slivers));
            }
            SnapshotRecord::VirtualMachine(r) => {
                let urn = r.sliver.sliver_urn.clone();
                self.vm_interfaces.push((urn, r.interfaces));
                let kind = SliverKind::VirtualMachine(VirtualMachine {
                    host: r.host,
                    os_image: r.os_image,
                    os_type: r.os_type,
                    os_version: r.os_version,
                    flavor: r.flavor,
                    mgmt_address: r.mgmt_address,
                    installs: r.installs,
                    executes: r.executes,
                    last_octet: r.last_octet,
                    interfaces: Vec::new(),
                });
                self.add_sliver(r.sliver, kind)?;
            }
            SnapshotRecord::NetworkInterface(r) => {
                let urn = r.sliver.sliver_urn.clone();
                self.interface_refs
                    .insert(urn, (r.virtual_machine, r.link));
                let kind = SliverKind::NetworkInterface(NetworkInterface {
                    device_number: r.device_number,
                    mac_address: r.mac_address,
                    ip_address: r.ip_address,
                    vlan_tag: r.vlan_tag,
                    virtual_machine: None,
                    link: None,
                });
                self.add_sliver(r.sliver, kind)?;
            }
            SnapshotRecord::NetworkLink(r) => {
                let urn = r.sliver.sliver_urn.clone();
                self.link_endpoints.push((urn.clone(), r.endpoints));
                if let Some(reservation) = r.stitching {
                    self.reservations.push((urn, reservation));
                }
                let kind = SliverKind::NetworkLink(NetworkLink {
                    subnet: r.subnet,
                    vlan_tag: r.vlan_tag,
                    network_uuid: r.network_uuid,
                    subnet_uuid: r.subnet_uuid,
                    endpoints: Vec::new(),
                });
                self.add_sliver(r.sliver, kind)?;
            }
        }
        Ok(())
    }

    fn add_sliver(&mut self, header: SliverHeader, kind: SliverKind) -> Result<(), SnapshotError> {
        Sliver::validate_states(header.allocation_state, header.operational_state)?;
        if self.slivers.contains_key(&header.sliver_urn) {
            return Err(SnapshotError::DuplicateRecord(header.sliver_urn.to_string()));
        }
        let sliver = Sliver {
            urn: header.sliver_urn.clone(),
            name: header.name,
            uuid: header.uuid,
            slice_urn: header.slice_urn,
            user_urn: header.user_urn,
            created_at: header.creation,
            expires_at: header.expiration,
            allocation_state: header.allocation_state,
            operational_state: header.operational_state,
            request: header.request_rspec,
            manifest: header.manifest_rspec,
            kind,
        };
        self.slivers.insert(header.sliver_urn, sliver);
        Ok(())
    }

    fn resolve(
        mut self,
        stitching: &dyn StitchingService,
    ) -> Result<IndexMap<SliceUrn, Slice>, SnapshotError> {
        let mut owners: HashMap<SliverUrn, SliceUrn> = HashMap::new();

        // Ownership, in the order each slice record lists its slivers
        for (slice_urn, (slice, listed)) in self.slices.iter_mut() {
            for urn in listed.iter() {
                let sliver = self.slivers.shift_remove(urn).ok_or_else(|| {
                    SnapshotError::DanglingReference {
                        from: slice_urn.to_string(),
                        to: urn.to_string(),
                    }
                })?;
                owners.insert(urn.clone(), slice_urn.clone());
                slice.add_sliver(sliver)?;
            }
        }
        for (urn, sliver) in std::mem::take(&mut self.slivers) {
            let (slice, _) = self
                .slices
                .get_mut(sliver.slice_urn())
                .ok_or_else(|| SnapshotError::OrphanSliver(urn.to_string()))?;
            owners.insert(urn, slice.urn().clone());
            slice.add_sliver(sliver)?;
        }

        // VM -> interface references
        for (vm, interfaces) in &self.vm_interfaces {
            for nic in interfaces {
                let recorded = self.interface_refs.get(nic).and_then(|(vm, _)| vm.as_ref());
                if recorded != Some(vm) {
                    return Err(SnapshotError::AsymmetricReference {
                        interface: nic.to_string(),
                        target: vm.to_string(),
                    });
                }
                let slice = Self::owning_slice(&mut self.slices, &owners, vm, nic)?;
                slice.attach_interface_to_vm(nic, vm)?;
            }
        }

        // Link -> interface references
        for (link, endpoints) in &self.link_endpoints {
            for nic in endpoints {
                let recorded = self.interface_refs.get(nic).and_then(|(_, l)| l.as_ref());
                if recorded != Some(link) {
                    return Err(SnapshotError::AsymmetricReference {
                        interface: nic.to_string(),
                        target: link.to_string(),
                    });
                }
                let slice = Self::owning_slice(&mut self.slices, &owners, link, nic)?;
                slice.attach_interface_to_link(nic, link)?;
            }
        }

        // Back-references with no matching forward reference
        for (nic, (vm, link)) in &self.interface_refs {
            let slice_urn = owners
                .get(nic)
                .ok_or_else(|| SnapshotError::OrphanSliver(nic.to_string()))?;
            let wired = self
                .slices
                .get(slice_urn)
                .and_then(|(slice, _)| slice.sliver(nic))
                .and_then(|s| s.as_interface())
                .map(|i| (i.virtual_machine().cloned(), i.link().cloned()));
            if let Some((wired_vm, wired_link)) = wired {
                if &wired_vm != vm || &wired_link != link {
                    return Err(SnapshotError::AsymmetricReference {
                        interface: nic.to_string(),
                        target: vm
                            .as_ref()
                            .or(link.as_ref())
                            .map(|u| u.to_string())
                            .unwrap_or_default(),
                    });
                }
            }
        }

        for (link, reservation) in &self.reservations {
            stitching.restore_reservation(link, reservation.vlan_tag, &reservation.port)?;
        }

        Ok(self
            .slices
            .into_iter()
            .map(|(urn, (slice, _))| (urn, slice))
            .collect())
    }

    fn owning_slice<'a>(
        slices: &'a mut IndexMap<SliceUrn, (Slice, Vec<SliverUrn>)>,
        owners: &HashMap<SliverUrn, SliceUrn>,
        from: &SliverUrn,
        to: &SliverUrn,
    ) -> Result<&'a mut Slice, SnapshotError> {
        let dangling = || SnapshotError::DanglingReference {
            from: from.to_string(),
            to: to.to_string(),
        };
        let slice_urn = owners.get(from).ok_or_else(dangling)?;
        if owners.get(to) != Some(slice_urn) {
            return Err(dangling());
        }
        slices
            .get_mut(slice_urn)
            .map(|(slice, _)| slice)
            .ok_or_else(dangling)
    }
}

/// Rebuild the slice graph from records
pub fn decode(
    records: Vec<SnapshotRecord>,
    stitching: &dyn StitchingService,
) -> Result<IndexMap<SliceUrn, Slice>, SnapshotError> {
    let mut decoder = SnapshotDecoder::default();
    for record in records {
        decoder.materialize(record)?;
    }
    decoder.resolve(stitching)
}

// ============================================================================
// Store Interface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Durable snapshot storage. Calls block on IO.
pub trait SnapshotStore: Send + Sync {
    /// Write a new snapshot and return where it landed
    fn persist(&self, records: &[SnapshotRecord]) -> Result<SnapshotInfo, SnapshotError>;

    fn load(&self, name: &str) -> Result<Vec<SnapshotRecord>, SnapshotError>;

    /// Snapshots, most recently modified first
    fn list(&self) -> Result<Vec<SnapshotInfo>, SnapshotError>;

    fn latest(&self) -> Result<Option<SnapshotInfo>, SnapshotError> {
        Ok(self.list()?.into_iter().next())
    }

    /// Delete all but the `keep` most recent snapshots, returning the removed ones
    fn prune(&self, keep: usize) -> Result<Vec<SnapshotInfo>, SnapshotError>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Duplicate record for {0}")]
    DuplicateRecord(String),

    #[error("Record {from} references missing entity {to}")]
    DanglingReference { from: String, to: String },

    #[error("Interface {interface} and {target} disagree about their relationship")]
    AsymmetricReference { interface: String, target: String },

    #[error("Sliver {0} has no slice record")]
    OrphanSliver(String),

    #[error(transparent)]
    State(#[from] SliverError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Stitching(#[from] StitchingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::stitching::InMemoryStitchingRegistry;

    fn sample_slice() -> Slice {
        let slice_urn = SliceUrn::new_unchecked("urn:publicid:IDN+gcf+slice+s1");
        let mut slice = Slice::new(slice_urn.clone(), "alice");
        slice.tenant_name = Some("s1".to_string());
        slice.last_subnet_assigned = 1;
        slice.next_vm_num = 2;

        let mk = |name: &str, kind| {
            let mut s = Sliver::new(
                SliverUrn::from(name),
                Uuid::new_v4(),
                name,
                slice_urn.clone(),
                "alice",
                kind,
            );
            s.mark_allocated().unwrap();
            s
        };
        slice
            .add_sliver(mk(
                "vm-1",
                SliverKind::VirtualMachine(VirtualMachine {
                    flavor: Some("m1.small".into()),
                    last_octet: 101,
                    ..Default::default()
                }),
            ))
            .unwrap();
        slice
            .add_sliver(mk(
                "interface-1",
                SliverKind::NetworkInterface(NetworkInterface {
                    ip_address: Some("10.0.1.101".into()),
                    ..Default::default()
                }),
            ))
            .unwrap();
        slice
            .add_sliver(mk(
                "link-1",
                SliverKind::NetworkLink(NetworkLink {
                    subnet: Some("10.0.1.0/24".into()),
                    vlan_tag: Some(1750),
                    ..Default::default()
                }),
            ))
            .unwrap();
        slice
            .attach_interface_to_vm(&"interface-1".into(), &"vm-1".into())
            .unwrap();
        slice
            .attach_interface_to_link(&"interface-1".into(), &"link-1".into())
            .unwrap();
        slice
    }

    #[test]
    fn test_encode_orders_slices_before_slivers() {
        let stitching = InMemoryStitchingRegistry::new();
        let records = encode(&[sample_slice()], &stitching);
        assert_eq!(records.len(), 4);
        assert!(matches!(records[0], SnapshotRecord::Slice(_)));
        assert!(records[1..]
            .iter()
            .all(|r| !matches!(r, SnapshotRecord::Slice(_))));

        let json = serde_json::to_value(&records[1]).unwrap();
        assert_eq!(json["type"], "virtual_machine");
        assert_eq!(json["interfaces"][0], "interface-1");
    }

    #[test]
    fn test_decode_restores_wiring_and_stitching() {
        let source = InMemoryStitchingRegistry::new();
        source
            .record_reservation(&"link-1".into(), 1750, "eth3")
            .unwrap();
        let original = sample_slice();
        let text = to_json(&encode(&[original.clone()], &source)).unwrap();

        let target = InMemoryStitchingRegistry::new();
        let restored = decode(from_json(&text).unwrap(), &target).unwrap();
        let slice = restored.get(original.urn()).unwrap();
        assert_eq!(slice, &original);
        assert_eq!(
            target.lookup_reservation(&"link-1".into()),
            Some(StitchingReservation {
                vlan_tag: 1750,
                port: "eth3".into()
            })
        );
    }

    #[test]
    fn test_decode_tolerates_out_of_order_records() {
        let stitching = InMemoryStitchingRegistry::new();
        let mut records = encode(&[sample_slice()], &stitching);
        records.reverse();
        let restored = decode(records, &stitching).unwrap();
        let slice = restored.values().next().unwrap();
        let link = slice.sliver(&"link-1".into()).unwrap().as_link().unwrap();
        assert_eq!(link.endpoints(), &[SliverUrn::from("interface-1")]);
    }

    #[test]
    fn test_decode_rejects_asymmetric_back_reference() {
        let stitching = InMemoryStitchingRegistry::new();
        let mut records = encode(&[sample_slice()], &stitching);
        for record in records.iter_mut() {
            if let SnapshotRecord::NetworkInterface(nic) = record {
                nic.link = None;
            }
        }
        assert!(matches!(
            decode(records, &stitching),
            Err(SnapshotError::AsymmetricReference { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_dangling_sliver_reference() {
        let stitching = InMemoryStitchingRegistry::new();
        let records: Vec<SnapshotRecord> = encode(&[sample_slice()], &stitching)
            .into_iter()
            .filter(|r| !matches!(r, SnapshotRecord::NetworkLink(_)))
            .collect();
        assert!(matches!(
            decode(records, &stitching),
            Err(SnapshotError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_inconsistent_states() {
        let stitching = InMemoryStitchingRegistry::new();
        let mut records = encode(&[sample_slice()], &stitching);
        if let SnapshotRecord::VirtualMachine(vm) = &mut records[1] {
            vm.sliver.operational_state = OperationalState::Ready;
        }
        assert!(matches!(decode(records, &stitching), Err(SnapshotError::State(_))));
    }
}
