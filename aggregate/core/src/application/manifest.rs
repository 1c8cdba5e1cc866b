// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::descriptor::{
    DescriptorError, ManifestDescriptor, ManifestInterface, ManifestLink, ManifestNode,
};
use crate::domain::slice::Slice;
use crate::domain::sliver::SliverKind;
use crate::domain::stitching::StitchingService;
use crate::domain::urn::SliverUrn;

/// Renders the manifest descriptor of a slice as YAML
pub struct ManifestRenderer;

impl ManifestRenderer {
    pub fn render(slice: &Slice, stitching: &dyn StitchingService) -> ManifestDescriptor {
        let mut manifest = ManifestDescriptor {
            slice_urn: slice.urn().to_string(),
            ..Default::default()
        };

        for sliver in slice.slivers() {
            match sliver.kind() {
                SliverKind::VirtualMachine(vm) => manifest.nodes.push(ManifestNode {
                    client_id: sliver.name.clone(),
                    sliver_urn: sliver.urn().clone(),
                    allocation_status: sliver.allocation_state(),
                    operational_status: sliver.operational_state(),
                    flavor: vm.flavor.clone(),
                    image: vm.os_image.clone(),
                    host: vm.host.clone(),
                    mgmt_address: vm.mgmt_address.clone(),
                    interfaces: vm
                        .interfaces()
                        .iter()
                        .filter_map(|nic| Self::interface(slice, nic))
                        .collect(),
                }),
                SliverKind::NetworkLink(link) => manifest.links.push(ManifestLink {
                    client_id: sliver.name.clone(),
                    sliver_urn: sliver.urn().clone(),
                    subnet: link.subnet.clone(),
                    vlan_tag: link.vlan_tag,
                    interfaces: link.endpoints().to_vec(),
                    stitching: stitching.lookup_reservation(sliver.urn()),
                }),
                SliverKind::NetworkInterface(_) => {}
            }
        }
        manifest
    }

    /// Regenerate the slice manifest and every sliver fragment.
    /// Returns the slice manifest text.
    pub fn apply(
        slice: &mut Slice,
        stitching: &dyn StitchingService,
    ) -> Result<String, DescriptorError> {
        let manifest = Self::render(slice, stitching);
        let text = to_yaml(&manifest)?;

        let mut fragments = Vec::with_capacity(slice.len());
        for node in &manifest.nodes {
            fragments.push((node.sliver_urn.clone(), to_yaml(node)?));
            for nic in &node.interfaces {
                fragments.push((nic.sliver_urn.clone(), to_yaml(nic)?));
            }
        }
        for link in &manifest.links {
            fragments.push((link.sliver_urn.clone(), to_yaml(link)?));
        }

        for (urn, fragment) in fragments {
            if let Some(sliver) = slice.sliver_mut(&urn) {
                sliver.manifest = Some(fragment);
            }
        }
        slice.manifest = Some(text.clone());
        Ok(text)
    }

    fn interface(slice: &Slice, urn: &SliverUrn) -> Option<ManifestInterface> {
        let sliver = slice.sliver(urn)?;
        let nic = sliver.as_interface()?;
        Some(ManifestInterface {
            client_id: sliver.name.clone(),
            sliver_urn: urn.clone(),
            mac_address: nic.mac_address.clone(),
            ip_address: nic.ip_address.clone(),
        })
    }
}

fn to_yaml<T: serde::Serialize>(value: &T) -> Result<String, DescriptorError> {
    serde_yaml::to_string(value).map_err(|e| DescriptorError::Render(e.to_string()))
}
