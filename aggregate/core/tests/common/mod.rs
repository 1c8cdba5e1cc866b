// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the aggregate manager integration tests

#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::Arc;

use gram_core::application::aggregate_manager::{
    AggregateSettings, Collaborators, StandardAggregateManager,
};
use gram_core::application::expiry::ExpirationPolicy;
use gram_core::domain::aggregate_config::BackendConfig;
use gram_core::domain::credential::{Credential, Privilege};
use gram_core::domain::registry::SliceRegistry;
use gram_core::domain::snapshot::SnapshotStore;
use gram_core::domain::urn::UrnAuthority;
use gram_core::infrastructure::descriptor_parser::YamlDescriptorParser;
use gram_core::infrastructure::dev_credentials::DevCredentialVerifier;
use gram_core::infrastructure::event_bus::EventBus;
use gram_core::infrastructure::simulated_backend::SimulatedBackend;
use gram_core::infrastructure::snapshot_store::FileSnapshotStore;
use gram_core::infrastructure::stitching::InMemoryStitchingRegistry;

pub const USER: &str = "urn:publicid:IDN+gcf+user+alice";

/// One VM with one interface
pub const ONE_VM: &str = r#"
nodes:
  - client_id: vm1
    flavor: m1.small
    interfaces:
      - client_id: vm1:if0
"#;

/// Two VMs on one LAN, the LAN stitched to VLAN 1750
pub const TWO_VM_LAN: &str = r#"
nodes:
  - client_id: vm1
    interfaces:
      - client_id: vm1:if0
  - client_id: vm2
    interfaces:
      - client_id: vm2:if0
links:
  - client_id: lan0
    interfaces: [vm1:if0, vm2:if0]
    stitching:
      vlan_tag: 1750
      port: eth1
"#;

pub const ALL_PRIVILEGES: [Privilege; 7] = [
    Privilege::Allocate,
    Privilege::Provision,
    Privilege::DeleteSliver,
    Privilege::PerformOperationalAction,
    Privilege::SliverStatus,
    Privilege::RenewSliver,
    Privilege::Shutdown,
];

pub struct Harness {
    pub manager: StandardAggregateManager,
    pub backend: Arc<SimulatedBackend>,
    pub stitching: Arc<InMemoryStitchingRegistry>,
    pub store: Option<Arc<FileSnapshotStore>>,
    pub events: EventBus,
}

pub fn slice_urn(name: &str) -> String {
    format!("urn:publicid:IDN+gcf+slice+{}", name)
}

pub fn settings(allocation_lifetime: Duration, retention: usize) -> AggregateSettings {
    AggregateSettings {
        authority: UrnAuthority::new("geni.net:gram").unwrap(),
        aggregate_urn: "urn:publicid:IDN+geni.net:gram+authority+am".to_string(),
        expiration: ExpirationPolicy {
            allocation_lifetime,
            provision_lifetime: Duration::days(1),
            allow_shorten: true,
        },
        max_vms_per_slice: 10,
        snapshot_retention: retention,
    }
}

/// Credential for `slice` valid for `valid_for`, carrying `privileges`
pub fn credential_for(slice: &str, privileges: &[Privilege], valid_for: Duration) -> Vec<Credential> {
    vec![DevCredentialVerifier::issue(
        USER,
        slice,
        privileges,
        Utc::now() + valid_for,
    )]
}

/// Two-hour credential carrying every privilege on `slice`
pub fn credential(slice: &str) -> Vec<Credential> {
    credential_for(slice, &ALL_PRIVILEGES, Duration::hours(2))
}

pub fn build(
    settings: AggregateSettings,
    registry: SliceRegistry,
    stitching: Arc<InMemoryStitchingRegistry>,
    store: Option<Arc<FileSnapshotStore>>,
) -> Harness {
    let backend = Arc::new(SimulatedBackend::new(&BackendConfig::default()));
    let events = EventBus::with_default_capacity();
    let collaborators = Collaborators {
        verifier: Arc::new(DevCredentialVerifier::new()),
        backend: backend.clone(),
        stitching: stitching.clone(),
        parser: Arc::new(YamlDescriptorParser::new()),
        snapshots: store.clone().map(|s| s as Arc<dyn SnapshotStore>),
        event_bus: events.clone(),
    };
    Harness {
        manager: StandardAggregateManager::new(settings, Arc::new(registry), collaborators),
        backend,
        stitching,
        store,
        events,
    }
}

/// In-memory harness without persistence
pub fn harness() -> Harness {
    build(
        settings(Duration::minutes(10), 5),
        SliceRegistry::new(),
        Arc::new(InMemoryStitchingRegistry::new()),
        None,
    )
}

/// Harness persisting snapshots into `dir`
pub fn harness_with_store(dir: &Path, retention: usize) -> Harness {
    build(
        settings(Duration::minutes(10), retention),
        SliceRegistry::new(),
        Arc::new(InMemoryStitchingRegistry::new()),
        Some(Arc::new(FileSnapshotStore::open(dir).unwrap())),
    )
}
