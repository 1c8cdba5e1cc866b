// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Slice construction from a parsed request descriptor.
//!
//! Every sliver is created Unallocated and moved to Allocated as it is added.
//! Link subnets and VM address octets come from the slice counters. If any
//! step fails, the slivers created so far are removed again and stitching
//! reservations taken by this build are released.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::descriptor::{LinkRequest, NodeRequest, RequestDescriptor};
use crate::domain::result::AmError;
use crate::domain::slice::Slice;
use crate::domain::sliver::{NetworkInterface, NetworkLink, Sliver, SliverKind, VirtualMachine};
use crate::domain::stitching::StitchingService;
use crate::domain::urn::{SliverType, SliverUrn, UrnAuthority};

pub struct SliceBuilder<'a> {
    authority: &'a UrnAuthority,
    stitching: &'a dyn StitchingService,
    max_vms: u32,
    expires_at: DateTime<Utc>,
    created: Vec<SliverUrn>,
    reserved: Vec<SliverUrn>,
    interfaces: HashMap<String, SliverUrn>,
}

impl<'a> SliceBuilder<'a> {
    pub fn new(
        authority: &'a UrnAuthority,
        stitching: &'a dyn StitchingService,
        max_vms: u32,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            authority,
            stitching,
            max_vms,
            expires_at,
            created: Vec::new(),
            reserved: Vec::new(),
            interfaces: HashMap::new(),
        }
    }

    /// Populate `slice` from `descriptor`, returning the URNs of the new
    /// slivers in creation order. On error the slice is left as it was.
    pub fn build(
        mut self,
        slice: &mut Slice,
        descriptor: &RequestDescriptor,
    ) -> Result<Vec<SliverUrn>, AmError> {
        match self.populate(slice, descriptor) {
            Ok(()) => Ok(self.created),
            Err(e) => {
                self.rollback(slice);
                Err(e)
            }
        }
    }

    fn populate(&mut self, slice: &mut Slice, descriptor: &RequestDescriptor) -> Result<(), AmError> {
        if descriptor.nodes.len() > self.max_vms as usize {
            return Err(AmError::RequestParseFailed(format!(
                "request asks for {} VMs, at most {} allowed per slice",
                descriptor.nodes.len(),
                self.max_vms
            )));
        }

        for node in &descriptor.nodes {
            self.add_node(slice, node)?;
        }
        for link in &descriptor.links {
            self.add_link(slice, link)?;
        }
        Ok(())
    }

    fn add_node(&mut self, slice: &mut Slice, node: &NodeRequest) -> Result<(), AmError> {
        let (vm_number, last_octet) = slice.next_vm_number().map_err(parse_failed)?;
        let vm = VirtualMachine {
            host: node.host.clone(),
            os_image: node.image.clone(),
            os_type: node.os_type.clone(),
            os_version: node.os_version.clone(),
            flavor: node.flavor.clone(),
            installs: node.installs.clone(),
            executes: node.executes.clone(),
            last_octet,
            ..Default::default()
        };
        let mut sliver = self.new_sliver(
            slice,
            &node.client_id,
            SliverKind::VirtualMachine(vm),
        );
        sliver.request = serde_yaml::to_string(node).ok();
        let vm_urn = self.add(slice, sliver)?;
        debug!(sliver = %vm_urn, vm_number, last_octet, "Created VM sliver");

        for (device_number, request) in node.interfaces.iter().enumerate() {
            let nic = NetworkInterface {
                device_number: device_number as u32,
                ip_address: request.ip.clone(),
                ..Default::default()
            };
            let sliver =
                self.new_sliver(slice, &request.client_id, SliverKind::NetworkInterface(nic));
            let nic_urn = self.add(slice, sliver)?;
            slice
                .attach_interface_to_vm(&nic_urn, &vm_urn)
                .map_err(parse_failed)?;
            self.interfaces.insert(request.client_id.clone(), nic_urn);
        }
        Ok(())
    }

    fn add_link(&mut self, slice: &mut Slice, request: &LinkRequest) -> Result<(), AmError> {
        let subnet_number = slice.next_subnet().map_err(parse_failed)?;
        let vlan_tag = request
            .stitching
            .as_ref()
            .map(|s| s.vlan_tag)
            .or(request.vlan_tag);
        let link = NetworkLink {
            subnet: Some(format!("10.0.{}.0/24", subnet_number)),
            vlan_tag,
            ..Default::default()
        };
        let mut sliver = self.new_sliver(slice, &request.client_id, SliverKind::NetworkLink(link));
        sliver.request = serde_yaml::to_string(request).ok();
        let link_urn = self.add(slice, sliver)?;

        if let Some(reservation) = &request.stitching {
            self.stitching
                .record_reservation(&link_urn, reservation.vlan_tag, &reservation.port)
                .map_err(parse_failed)?;
            self.reserved.push(link_urn.clone());
        }

        for client_id in &request.interfaces {
            let nic_urn = self.interfaces.get(client_id).cloned().ok_or_else(|| {
                AmError::RequestParseFailed(format!(
                    "link '{}' references unknown interface '{}'",
                    request.client_id, client_id
                ))
            })?;
            slice
                .attach_interface_to_link(&nic_urn, &link_urn)
                .map_err(parse_failed)?;

            let last_octet = slice
                .sliver(&nic_urn)
                .and_then(|s| s.as_interface())
                .and_then(|nic| nic.virtual_machine())
                .and_then(|vm| slice.sliver(vm))
                .and_then(|s| s.as_vm())
                .map(|vm| vm.last_octet);
            if let Some(nic) = slice.sliver_mut(&nic_urn).and_then(|s| s.as_interface_mut()) {
                nic.vlan_tag = vlan_tag;
                if nic.ip_address.is_none() {
                    nic.ip_address =
                        last_octet.map(|octet| format!("10.0.{}.{}", subnet_number, octet));
                }
            }
        }
        Ok(())
    }

    fn new_sliver(&self, slice: &Slice, client_id: &str, kind: SliverKind) -> Sliver {
        let uuid = Uuid::new_v4();
        let sliver_type: SliverType = kind.sliver_type();
        let mut sliver = Sliver::new(
            self.authority.mint_sliver_urn(sliver_type, uuid),
            uuid,
            client_id,
            slice.urn().clone(),
            slice.user_urn.clone(),
            kind,
        );
        sliver.expires_at = self.expires_at;
        sliver
    }

    fn add(&mut self, slice: &mut Slice, mut sliver: Sliver) -> Result<SliverUrn, AmError> {
        sliver
            .mark_allocated()
            .map_err(|e| AmError::RequestParseFailed(e.to_string()))?;
        let urn = sliver.urn().clone();
        slice.add_sliver(sliver).map_err(parse_failed)?;
        self.created.push(urn.clone());
        Ok(urn)
    }

    fn rollback(&mut self, slice: &mut Slice) {
        for urn in self.reserved.drain(..) {
            self.stitching.release_reservation(&urn);
        }
        for urn in self.created.drain(..).rev() {
            if let Err(e) = slice.remove_sliver(&urn) {
                warn!(sliver = %urn, error = %e, "Rollback could not remove sliver");
            }
        }
        debug!(slice = %slice.urn(), "Rolled back partial allocation");
    }
}

fn parse_failed(e: impl std::fmt::Display) -> AmError {
    AmError::RequestParseFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::InterfaceRequest;
    use crate::domain::sliver::AllocationState;
    use crate::domain::stitching::StitchingReservation;
    use crate::domain::urn::SliceUrn;
    use crate::infrastructure::stitching::InMemoryStitchingRegistry;
    use chrono::Duration;

    fn node(id: &str, nics: &[&str]) -> NodeRequest {
        NodeRequest {
            client_id: id.to_string(),
            interfaces: nics
                .iter()
                .map(|n| InterfaceRequest {
                    client_id: n.to_string(),
                    ip: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn link(id: &str, nics: &[&str], stitching: Option<StitchingReservation>) -> LinkRequest {
        LinkRequest {
            client_id: id.to_string(),
            interfaces: nics.iter().map(|n| n.to_string()).collect(),
            vlan_tag: None,
            stitching,
        }
    }

    fn empty_slice() -> Slice {
        Slice::new(
            SliceUrn::new_unchecked("urn:publicid:IDN+gcf+slice+s1"),
            "urn:publicid:IDN+gcf+user+alice",
        )
    }

    #[test]
    fn test_builds_wired_allocated_slice() {
        let authority = UrnAuthority::new("geni.net:gram").unwrap();
        let stitching = InMemoryStitchingRegistry::new();
        let expires = Utc::now() + Duration::minutes(10);
        let descriptor = RequestDescriptor {
            nodes: vec![node("vm-a", &["a:if0"]), node("vm-b", &["b:if0"])],
            links: vec![link("lan0", &["a:if0", "b:if0"], None)],
        };

        let mut slice = empty_slice();
        let created = SliceBuilder::new(&authority, &stitching, 10, expires)
            .build(&mut slice, &descriptor)
            .unwrap();

        assert_eq!(created.len(), 5);
        assert!(slice
            .slivers()
            .all(|s| s.allocation_state() == AllocationState::Allocated && s.expires_at == expires));

        let link = slice.slivers_of_type(SliverType::NetworkLink).next().unwrap();
        let link = link.as_link().unwrap();
        assert_eq!(link.subnet.as_deref(), Some("10.0.1.0/24"));
        assert_eq!(link.endpoints().len(), 2);

        let addresses: Vec<_> = slice
            .slivers_of_type(SliverType::NetworkInterface)
            .filter_map(|s| s.as_interface().and_then(|n| n.ip_address.clone()))
            .collect();
        assert_eq!(addresses, vec!["10.0.1.101", "10.0.1.102"]);
        assert_eq!(slice.next_vm_num(), 3);
    }

    #[test]
    fn test_failure_rolls_back_slivers_and_reservations() {
        let authority = UrnAuthority::new("geni.net:gram").unwrap();
        let stitching = InMemoryStitchingRegistry::new();
        // VLAN 0 is outside the valid range, so the second link fails
        let descriptor = RequestDescriptor {
            nodes: vec![node("vm-a", &["a:if0", "a:if1"])],
            links: vec![
                link(
                    "wan0",
                    &["a:if0"],
                    Some(StitchingReservation {
                        vlan_tag: 1750,
                        port: "eth1".to_string(),
                    }),
                ),
                link(
                    "wan1",
                    &["a:if1"],
                    Some(StitchingReservation {
                        vlan_tag: 0,
                        port: "eth1".to_string(),
                    }),
                ),
            ],
        };

        let mut slice = empty_slice();
        let err = SliceBuilder::new(&authority, &stitching, 10, Utc::now())
            .build(&mut slice, &descriptor)
            .unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(slice.is_empty());
        assert!(stitching.is_empty());
    }

    #[test]
    fn test_vm_limit() {
        let authority = UrnAuthority::new("geni.net:gram").unwrap();
        let stitching = InMemoryStitchingRegistry::new();
        let descriptor = RequestDescriptor {
            nodes: vec![node("vm-a", &[]), node("vm-b", &[])],
            links: vec![],
        };
        let mut slice = empty_slice();
        let err = SliceBuilder::new(&authority, &stitching, 1, Utc::now())
            .build(&mut slice, &descriptor)
            .unwrap_err();
        assert!(matches!(err, AmError::RequestParseFailed(_)));
        assert!(slice.is_empty());
    }
}
