// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Simulated compute backend
//
// Places VMs on configured hosts round robin, hands out management addresses
// and MAC addresses, and tracks which slivers hold backend resources. Fault
// hooks let tests make provisioning, teardown or a running VM fail.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregate_config::BackendConfig;
use crate::domain::backend::{
    BackendError, ComputeBackend, Flavor, InterfaceAssignment, LinkAssignment, ProvisioningReport,
    TeardownFailure, TeardownReport, UserAccount, VmAssignment,
};
use crate::domain::slice::Slice;
use crate::domain::sliver::{AllocationState, OperationalState, SliverKind};
use crate::domain::urn::SliverUrn;

#[derive(Default)]
struct SimState {
    next_host: usize,
    next_mgmt_octet: u32,
    next_mac: u32,
    resources: HashMap<SliverUrn, String>,
    provision_failure: Option<String>,
    teardown_failures: HashSet<SliverUrn>,
    crashed: HashSet<SliverUrn>,
}

pub struct SimulatedBackend {
    flavors: Vec<Flavor>,
    hosts: Vec<String>,
    mgmt_prefix: String,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            flavors: config.flavors.clone(),
            hosts: config.hosts.clone(),
            mgmt_prefix: config.mgmt_prefix.clone(),
            state: Mutex::new(SimState {
                next_mgmt_octet: 2,
                ..Default::default()
            }),
        }
    }

    /// Number of slivers currently holding backend resources
    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    pub fn holds_resources(&self, sliver: &SliverUrn) -> bool {
        self.state.lock().resources.contains_key(sliver)
    }

    /// Make every following provisioning call fail with `reason`
    pub fn fail_provisioning(&self, reason: Option<&str>) {
        self.state.lock().provision_failure = reason.map(str::to_string);
    }

    /// Make teardown of one sliver fail
    pub fn fail_teardown_for(&self, sliver: SliverUrn) {
        self.state.lock().teardown_failures.insert(sliver);
    }

    /// Report a provisioned VM as no longer running
    pub fn crash(&self, sliver: SliverUrn) {
        self.state.lock().crashed.insert(sliver);
    }

    fn place(&self, state: &mut SimState, requested: Option<&str>) -> Result<String, BackendError> {
        if let Some(host) = requested {
            if self.hosts.iter().any(|h| h == host) {
                return Ok(host.to_string());
            }
            warn!(host, "Requested host unknown, placing round robin");
        }
        if self.hosts.is_empty() {
            return Err(BackendError::NoHostAvailable);
        }
        let host = self.hosts[state.next_host % self.hosts.len()].clone();
        state.next_host += 1;
        Ok(host)
    }

    fn next_mgmt_address(&self, state: &mut SimState) -> Result<String, BackendError> {
        if state.next_mgmt_octet > 254 {
            return Err(BackendError::Unavailable(
                "management network exhausted".to_string(),
            ));
        }
        let address = format!("{}.{}", self.mgmt_prefix, state.next_mgmt_octet);
        state.next_mgmt_octet += 1;
        Ok(address)
    }

    fn next_mac(state: &mut SimState) -> String {
        let n = state.next_mac;
        state.next_mac += 1;
        format!(
            "fa:16:3e:{:02x}:{:02x}:{:02x}",
            (n >> 16) & 0xff,
            (n >> 8) & 0xff,
            n & 0xff
        )
    }
}

#[async_trait]
impl ComputeBackend for SimulatedBackend {
    async fn provision_resources(
        &self,
        slice: &Slice,
        slivers: &[SliverUrn],
        users: &[UserAccount],
    ) -> Result<ProvisioningReport, BackendError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.provision_failure {
            return Err(BackendError::Unavailable(reason.clone()));
        }

        let mut report = ProvisioningReport::default();
        for urn in slivers {
            let Some(sliver) = slice.sliver(urn) else {
                continue;
            };
            match sliver.kind() {
                SliverKind::VirtualMachine(vm) => {
                    if let Some(flavor) = &vm.flavor {
                        if !self.flavors.iter().any(|f| &f.name == flavor) {
                            return Err(BackendError::UnknownFlavor(flavor.clone()));
                        }
                    }
                    let host = self.place(&mut state, vm.host.as_deref())?;
                    let mgmt_address = self.next_mgmt_address(&mut state)?;
                    debug!(sliver = %urn, host = %host, mgmt = %mgmt_address, "Placed VM");
                    report.vms.insert(urn.clone(), VmAssignment { host, mgmt_address });
                }
                SliverKind::NetworkInterface(_) => {
                    let mac_address = Self::next_mac(&mut state);
                    report
                        .interfaces
                        .insert(urn.clone(), InterfaceAssignment { mac_address });
                }
                SliverKind::NetworkLink(_) => {
                    report.links.insert(
                        urn.clone(),
                        LinkAssignment {
                            network_uuid: Uuid::new_v4().to_string(),
                            subnet_uuid: Uuid::new_v4().to_string(),
                        },
                    );
                }
            }
        }

        for urn in slivers {
            state
                .resources
                .insert(urn.clone(), slice.urn().to_string());
        }

        info!(
            slice = %slice.urn(),
            slivers = slivers.len(),
            users = users.len(),
            "Provisioned backend resources"
        );
        Ok(report)
    }

    async fn update_operational_status(
        &self,
        slice: &Slice,
    ) -> Result<IndexMap<SliverUrn, OperationalState>, BackendError> {
        let state = self.state.lock();
        Ok(slice
            .slivers()
            .filter(|s| s.allocation_state() == AllocationState::Provisioned)
            .filter(|s| state.resources.contains_key(s.urn()))
            .map(|s| {
                let status = if state.crashed.contains(s.urn()) {
                    OperationalState::NotReady
                } else {
                    s.operational_state()
                };
                (s.urn().clone(), status)
            })
            .collect())
    }

    async fn delete_all_resources_for_slice(&self, slice: &Slice) -> TeardownReport {
        let mut state = self.state.lock();
        let mut report = TeardownReport::default();
        for sliver in slice.slivers() {
            if state.teardown_failures.contains(sliver.urn()) {
                warn!(sliver = %sliver.urn(), "Backend teardown failed");
                report.failures.push(TeardownFailure {
                    sliver: sliver.urn().clone(),
                    reason: "simulated teardown failure".to_string(),
                });
                continue;
            }
            state.resources.remove(sliver.urn());
            state.crashed.remove(sliver.urn());
        }
        info!(
            slice = %slice.urn(),
            failures = report.failures.len(),
            "Deleted backend resources"
        );
        report
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>, BackendError> {
        Ok(self.flavors.clone())
    }
}
