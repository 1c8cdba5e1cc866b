// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use thiserror::Error;

use crate::domain::sliver::{NetworkInterface, NetworkLink, Sliver, SliverKind, VirtualMachine};
use crate::domain::urn::{SliceUrn, SliverType, SliverUrn};

/// First data-plane host octet; VM number n is addressed as `BASE + n`
pub const VM_OCTET_BASE: u8 = 100;
/// Highest host octet handed to a VM; 255 is the subnet broadcast address.
pub const VM_OCTET_MAX: u8 = 254;

// ============================================================================
// Aggregate Root
// ============================================================================

/// Tenant-scoped container that exclusively owns its slivers.
///
/// Cross-sliver references (VM to interface, interface to link) are stored as
/// URNs and only changed through the attach/detach operations below, which
/// keep both ends in step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    urn: SliceUrn,
    pub user_urn: String,
    pub tenant_name: Option<String>,
    pub tenant_uuid: Option<String>,
    pub controller_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub request: Option<String>,
    pub manifest: Option<String>,
    pub(crate) last_subnet_assigned: u32,
    pub(crate) next_vm_num: u32,
    pub(crate) shutdown: bool,
    slivers: IndexMap<SliverUrn, Sliver>,
}

impl Slice {
    pub fn new(urn: SliceUrn, user_urn: impl Into<String>) -> Self {
        Self {
            urn,
            user_urn: user_urn.into(),
            tenant_name: None,
            tenant_uuid: None,
            controller_url: None,
            expires_at: Utc::now(),
            request: None,
            manifest: None,
            last_subnet_assigned: 0,
            next_vm_num: 1,
            shutdown: false,
            slivers: IndexMap::new(),
        }
    }

    pub fn urn(&self) -> &SliceUrn {
        &self.urn
    }

    pub fn is_empty(&self) -> bool {
        self.slivers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slivers.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub(crate) fn mark_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub fn last_subnet_assigned(&self) -> u32 {
        self.last_subnet_assigned
    }

    pub fn next_vm_num(&self) -> u32 {
        self.next_vm_num
    }

    pub fn contains(&self, urn: &SliverUrn) -> bool {
        self.slivers.contains_key(urn)
    }

    pub fn sliver(&self, urn: &SliverUrn) -> Option<&Sliver> {
        self.slivers.get(urn)
    }

    pub fn sliver_mut(&mut self, urn: &SliverUrn) -> Option<&mut Sliver> {
        self.slivers.get_mut(urn)
    }

    /// Slivers in insertion order
    pub fn slivers(&self) -> impl Iterator<Item = &Sliver> {
        self.slivers.values()
    }

    pub fn slivers_mut(&mut self) -> impl Iterator<Item = &mut Sliver> {
        self.slivers.values_mut()
    }

    pub fn sliver_urns(&self) -> Vec<SliverUrn> {
        self.slivers.keys().cloned().collect()
    }

    pub fn slivers_of_type(&self, sliver_type: SliverType) -> impl Iterator<Item = &Sliver> {
        self.slivers
            .values()
            .filter(move |s| s.sliver_type() == sliver_type)
    }

    /// Hand out the next link subnet number
    pub fn next_subnet(&mut self) -> Result<u32, GraphError> {
        let next = self.last_subnet_assigned + 1;
        if next > 255 {
            return Err(GraphError::AddressSpaceExhausted);
        }
        self.last_subnet_assigned = next;
        Ok(next)
    }

    /// Hand out the next VM number together with the address octet it fixes
    pub fn next_vm_number(&mut self) -> Result<(u32, u8), GraphError> {
        let n = self.next_vm_num;
        let octet = u8::try_from(n)
            .ok()
            .and_then(|n| VM_OCTET_BASE.checked_add(n))
            .filter(|octet| *octet <= VM_OCTET_MAX)
            .ok_or(GraphError::AddressSpaceExhausted)?;
        self.next_vm_num += 1;
        Ok((n, octet))
    }

    pub fn has_expired_slivers(&self, now: DateTime<Utc>) -> bool {
        self.slivers.values().any(|s| s.has_expired(now))
    }

    /// Slice expiration follows the latest sliver expiration
    pub fn refresh_expiration(&mut self) {
        if let Some(latest) = self.slivers.values().map(|s| s.expires_at).max() {
            self.expires_at = latest;
        }
    }

    // ------------------------------------------------------------------------
    // Ownership operations
    // ------------------------------------------------------------------------

    /// Take ownership of an unwired sliver
    pub fn add_sliver(&mut self, sliver: Sliver) -> Result<(), GraphError> {
        if sliver.slice_urn() != &self.urn {
            return Err(GraphError::ForeignSliver {
                sliver: sliver.urn().clone(),
                slice: sliver.slice_urn().clone(),
            });
        }
        if self.slivers.contains_key(sliver.urn()) {
            return Err(GraphError::DuplicateSliver(sliver.urn().clone()));
        }
        let wired = match sliver.kind() {
            SliverKind::VirtualMachine(vm) => !vm.interfaces.is_empty(),
            SliverKind::NetworkInterface(nic) => nic.virtual_machine.is_some() || nic.link.is_some(),
            SliverKind::NetworkLink(link) => !link.endpoints.is_empty(),
        };
        if wired {
            return Err(GraphError::PrewiredSliver(sliver.urn().clone()));
        }
        self.slivers.insert(sliver.urn().clone(), sliver);
        Ok(())
    }

    /// Remove a sliver, detaching every reference to it first
    pub fn remove_sliver(&mut self, urn: &SliverUrn) -> Result<Sliver, GraphError> {
        let kind = self
            .slivers
            .get(urn)
            .map(|s| s.kind().clone())
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?;

        match kind {
            SliverKind::VirtualMachine(vm) => {
                for nic in vm.interfaces {
                    self.detach_interface_from_vm(&nic, urn)?;
                }
            }
            SliverKind::NetworkInterface(nic) => {
                if let Some(vm) = nic.virtual_machine {
                    self.detach_interface_from_vm(urn, &vm)?;
                }
                if let Some(link) = nic.link {
                    self.detach_interface_from_link(urn, &link)?;
                }
            }
            SliverKind::NetworkLink(link) => {
                for nic in link.endpoints {
                    self.detach_interface_from_link(&nic, urn)?;
                }
            }
        }

        self.slivers
            .shift_remove(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))
    }

    pub fn attach_interface_to_vm(
        &mut self,
        interface: &SliverUrn,
        vm: &SliverUrn,
    ) -> Result<(), GraphError> {
        self.expect_kind(vm, SliverType::VirtualMachine)?;
        if self.interface(interface)?.virtual_machine.is_some() {
            return Err(GraphError::AlreadyAttached(interface.clone()));
        }

        self.interface_mut(interface)?.virtual_machine = Some(vm.clone());
        self.vm_mut(vm)?.interfaces.push(interface.clone());
        Ok(())
    }

    pub fn detach_interface_from_vm(
        &mut self,
        interface: &SliverUrn,
        vm: &SliverUrn,
    ) -> Result<(), GraphError> {
        if self.interface(interface)?.virtual_machine.as_ref() != Some(vm) {
            return Err(GraphError::NotAttached {
                interface: interface.clone(),
                target: vm.clone(),
            });
        }

        self.interface_mut(interface)?.virtual_machine = None;
        self.vm_mut(vm)?.interfaces.retain(|u| u != interface);
        Ok(())
    }

    pub fn attach_interface_to_link(
        &mut self,
        interface: &SliverUrn,
        link: &SliverUrn,
    ) -> Result<(), GraphError> {
        self.expect_kind(link, SliverType::NetworkLink)?;
        if self.interface(interface)?.link.is_some() {
            return Err(GraphError::AlreadyAttached(interface.clone()));
        }

        self.interface_mut(interface)?.link = Some(link.clone());
        self.link_mut(link)?.endpoints.push(interface.clone());
        Ok(())
    }

    pub fn detach_interface_from_link(
        &mut self,
        interface: &SliverUrn,
        link: &SliverUrn,
    ) -> Result<(), GraphError> {
        if self.interface(interface)?.link.as_ref() != Some(link) {
            return Err(GraphError::NotAttached {
                interface: interface.clone(),
                target: link.clone(),
            });
        }

        self.interface_mut(interface)?.link = None;
        self.link_mut(link)?.endpoints.retain(|u| u != interface);
        Ok(())
    }

    fn expect_kind(&self, urn: &SliverUrn, expected: SliverType) -> Result<(), GraphError> {
        let sliver = self
            .slivers
            .get(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?;
        if sliver.sliver_type() != expected {
            return Err(GraphError::WrongKind {
                sliver: urn.clone(),
                expected,
            });
        }
        Ok(())
    }

    fn interface(
        &self,
        urn: &SliverUrn,
    ) -> Result<&NetworkInterface, GraphError> {
        self.slivers
            .get(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?
            .as_interface()
            .ok_or_else(|| GraphError::WrongKind {
                sliver: urn.clone(),
                expected: SliverType::NetworkInterface,
            })
    }

    fn interface_mut(
        &mut self,
        urn: &SliverUrn,
    ) -> Result<&mut NetworkInterface, GraphError> {
        self.slivers
            .get_mut(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?
            .as_interface_mut()
            .ok_or_else(|| GraphError::WrongKind {
                sliver: urn.clone(),
                expected: SliverType::NetworkInterface,
            })
    }

    fn vm_mut(
        &mut self,
        urn: &SliverUrn,
    ) -> Result<&mut VirtualMachine, GraphError> {
        self.slivers
            .get_mut(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?
            .as_vm_mut()
            .ok_or_else(|| GraphError::WrongKind {
                sliver: urn.clone(),
                expected: SliverType::VirtualMachine,
            })
    }

    fn link_mut(
        &mut self,
        urn: &SliverUrn,
    ) -> Result<&mut NetworkLink, GraphError> {
        self.slivers
            .get_mut(urn)
            .ok_or_else(|| GraphError::UnknownSliver(urn.clone()))?
            .as_link_mut()
            .ok_or_else(|| GraphError::WrongKind {
                sliver: urn.clone(),
                expected: SliverType::NetworkLink,
            })
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Sliver not found in slice: {0}")]
    UnknownSliver(SliverUrn),

    #[error("Sliver already present: {0}")]
    DuplicateSliver(SliverUrn),

    #[error("Sliver {sliver} belongs to slice {slice}")]
    ForeignSliver { sliver: SliverUrn, slice: SliceUrn },

    #[error("Sliver {sliver} is not a {expected}")]
    WrongKind {
        sliver: SliverUrn,
        expected: SliverType,
    },

    #[error("Sliver {0} must be added without references")]
    PrewiredSliver(SliverUrn),

    #[error("Interface {0} is already attached")]
    AlreadyAttached(SliverUrn),

    #[error("Interface {interface} is not attached to {target}")]
    NotAttached {
        interface: SliverUrn,
        target: SliverUrn,
    },

    #[error("Slice address space exhausted")]
    AddressSpaceExhausted,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn slice_urn() -> SliceUrn {
        SliceUrn::new_unchecked("urn:publicid:IDN+gcf+slice+s1")
    }

    fn sliver(name: &str, kind: SliverKind) -> Sliver {
        Sliver::new(
            SliverUrn::new(format!("urn:publicid:IDN+gram+sliver+{}", name)),
            Uuid::new_v4(),
            name,
            slice_urn(),
            "urn:publicid:IDN+gcf+user+alice",
            kind,
        )
    }

    fn wired_slice() -> Slice {
        let mut slice = Slice::new(slice_urn(), "urn:publicid:IDN+gcf+user+alice");
        slice
            .add_sliver(sliver("vm-1", SliverKind::VirtualMachine(VirtualMachine::default())))
            .unwrap();
        slice
            .add_sliver(sliver("interface-1", SliverKind::NetworkInterface(NetworkInterface::default())))
            .unwrap();
        slice
            .add_sliver(sliver("link-1", SliverKind::NetworkLink(NetworkLink::default())))
            .unwrap();

        let vm = SliverUrn::from("urn:publicid:IDN+gram+sliver+vm-1");
        let nic = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");
        let link = SliverUrn::from("urn:publicid:IDN+gram+sliver+link-1");
        slice.attach_interface_to_vm(&nic, &vm).unwrap();
        slice.attach_interface_to_link(&nic, &link).unwrap();
        slice
    }

    #[test]
    fn test_attach_keeps_both_ends() {
        let slice = wired_slice();
        let nic_urn = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");

        let vm = slice.sliver(&"urn:publicid:IDN+gram+sliver+vm-1".into()).unwrap();
        assert_eq!(vm.as_vm().unwrap().interfaces(), &[nic_urn.clone()]);

        let link = slice.sliver(&"urn:publicid:IDN+gram+sliver+link-1".into()).unwrap();
        assert_eq!(link.as_link().unwrap().endpoints(), &[nic_urn.clone()]);

        let nic = slice.sliver(&nic_urn).unwrap().as_interface().unwrap();
        assert_eq!(nic.link().map(|u| u.as_str()), Some("urn:publicid:IDN+gram+sliver+link-1"));
    }

    #[test]
    fn test_double_attach_rejected() {
        let mut slice = wired_slice();
        let nic = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");
        let link = SliverUrn::from("urn:publicid:IDN+gram+sliver+link-1");
        assert_eq!(
            slice.attach_interface_to_link(&nic, &link),
            Err(GraphError::AlreadyAttached(nic.clone()))
        );
    }

    #[test]
    fn test_attach_to_wrong_kind_rejected() {
        let mut slice = wired_slice();
        let nic = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");
        let vm = SliverUrn::from("urn:publicid:IDN+gram+sliver+vm-1");
        let err = slice.attach_interface_to_link(&nic, &vm).unwrap_err();
        assert!(matches!(err, GraphError::WrongKind { .. }));
    }

    #[test]
    fn test_remove_interface_detaches_symmetrically() {
        let mut slice = wired_slice();
        let nic = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");
        slice.remove_sliver(&nic).unwrap();

        let vm = slice.sliver(&"urn:publicid:IDN+gram+sliver+vm-1".into()).unwrap();
        assert!(vm.as_vm().unwrap().interfaces().is_empty());
        let link = slice.sliver(&"urn:publicid:IDN+gram+sliver+link-1".into()).unwrap();
        assert!(link.as_link().unwrap().endpoints().is_empty());
        assert_eq!(slice.len(), 2);
    }

    #[test]
    fn test_remove_link_clears_interface_back_reference() {
        let mut slice = wired_slice();
        slice
            .remove_sliver(&"urn:publicid:IDN+gram+sliver+link-1".into())
            .unwrap();
        let nic = slice
            .sliver(&"urn:publicid:IDN+gram+sliver+interface-1".into())
            .unwrap()
            .as_interface()
            .unwrap();
        assert!(nic.link().is_none());
        assert!(nic.virtual_machine().is_some());
    }

    #[test]
    fn test_detach_missing_reference_is_error() {
        let mut slice = wired_slice();
        let nic = SliverUrn::from("urn:publicid:IDN+gram+sliver+interface-1");
        let link = SliverUrn::from("urn:publicid:IDN+gram+sliver+link-1");
        slice.detach_interface_from_link(&nic, &link).unwrap();
        assert!(matches!(
            slice.detach_interface_from_link(&nic, &link),
            Err(GraphError::NotAttached { .. })
        ));
    }

    #[test]
    fn test_add_rejects_duplicates_and_foreign_slivers() {
        let mut slice = wired_slice();
        let dup = sliver("vm-1", SliverKind::VirtualMachine(VirtualMachine::default()));
        assert!(matches!(slice.add_sliver(dup), Err(GraphError::DuplicateSliver(_))));

        let foreign = Sliver::new(
            SliverUrn::from("urn:publicid:IDN+gram+sliver+vm-9"),
            Uuid::new_v4(),
            "vm9",
            SliceUrn::new_unchecked("urn:publicid:IDN+gcf+slice+other"),
            "alice",
            SliverKind::VirtualMachine(VirtualMachine::default()),
        );
        assert!(matches!(slice.add_sliver(foreign), Err(GraphError::ForeignSliver { .. })));
    }

    #[test]
    fn test_counters() {
        let mut slice = Slice::new(slice_urn(), "alice");
        assert_eq!(slice.next_subnet().unwrap(), 1);
        assert_eq!(slice.next_subnet().unwrap(), 2);
        assert_eq!(slice.next_vm_number().unwrap(), (1, 101));
        assert_eq!(slice.next_vm_number().unwrap(), (2, 102));
        assert_eq!(slice.last_subnet_assigned(), 2);
        assert_eq!(slice.next_vm_num(), 3);
    }

    #[test]
    fn test_vm_octets_stop_before_broadcast() {
        let mut slice = Slice::new(slice_urn(), "alice");
        slice.next_vm_num = 154;
        assert_eq!(slice.next_vm_number().unwrap(), (154, 254));
        assert!(matches!(
            slice.next_vm_number(),
            Err(GraphError::AddressSpaceExhausted)
        ));
        assert_eq!(slice.next_vm_num(), 155);
    }

    #[test]
    fn test_refresh_expiration_takes_latest_sliver() {
        let mut slice = wired_slice();
        let later = Utc::now() + chrono::Duration::hours(5);
        slice
            .sliver_mut(&"urn:publicid:IDN+gram+sliver+link-1".into())
            .unwrap()
            .expires_at = later;
        slice.refresh_expiration();
        assert_eq!(slice.expires_at, later);
    }
}
