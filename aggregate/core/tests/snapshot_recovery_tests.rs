// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot persistence through the manager and recovery into a fresh one.

mod common;

use chrono::Duration;
use common::*;
use gram_core::application::aggregate_manager::AggregateManager;
use gram_core::application::recovery::recover;
use gram_core::domain::aggregate_config::SnapshotConfig;
use gram_core::domain::events::SliceEvent;
use gram_core::domain::registry::SliceRegistry;
use gram_core::domain::result::AmOptions;
use gram_core::domain::sliver::AllocationState;
use gram_core::domain::snapshot::SnapshotStore;
use gram_core::domain::stitching::StitchingService;
use gram_core::domain::urn::{SliceUrn, SliverUrn};
use gram_core::infrastructure::snapshot_store::FileSnapshotStore;
use gram_core::infrastructure::stitching::InMemoryStitchingRegistry;
use std::sync::Arc;

fn recover_config(retention: usize) -> SnapshotConfig {
    SnapshotConfig {
        directory: None,
        retention,
        recover_from: None,
        recover_most_recent: true,
    }
}

#[tokio::test]
async fn test_recovery_restores_wiring_counters_and_stitching() {
    let dir = tempfile::tempdir().unwrap();
    let s1 = slice_urn("s1");
    let creds = credential(&s1);
    let options = AmOptions::default();

    let allocated = {
        let h = harness_with_store(dir.path(), 5);
        let allocated = h.manager.allocate(&s1, &creds, TWO_VM_LAN, &options).await.unwrap();
        // Provision the first VM so both allocation states are on disk
        let first_vm = vec![allocated.geni_slivers[0].geni_sliver_urn.to_string()];
        h.manager.provision(&first_vm, &creds, &options).await.unwrap();
        allocated
    };
    let urns: Vec<SliverUrn> = allocated
        .geni_slivers
        .iter()
        .map(|s| s.geni_sliver_urn.clone())
        .collect();
    let (vm1, nic1, vm2, nic2, lan) = (&urns[0], &urns[1], &urns[2], &urns[3], &urns[4]);

    let store = Arc::new(FileSnapshotStore::open(dir.path()).unwrap());
    let stitching = Arc::new(InMemoryStitchingRegistry::new());
    let state = recover(store.as_ref(), &recover_config(5), stitching.as_ref()).unwrap();
    assert!(state.source.is_some());
    assert_eq!(state.slices.len(), 1);

    let reservation = stitching.lookup_reservation(lan).unwrap();
    assert_eq!(reservation.vlan_tag, 1750);
    assert_eq!(reservation.port, "eth1");

    let h = build(
        settings(Duration::minutes(10), 5),
        SliceRegistry::from_slices(state.slices),
        stitching,
        Some(store),
    );
    {
        let handle = h
            .manager
            .registry()
            .get(&SliceUrn::new_unchecked(s1.as_str()))
            .unwrap();
        let slice = handle.lock().await;
        assert_eq!(slice.len(), 5);
        assert_eq!(slice.last_subnet_assigned(), 1);
        assert_eq!(slice.next_vm_num(), 3);

        let vm = slice.sliver(vm1).unwrap();
        assert_eq!(vm.allocation_state(), AllocationState::Provisioned);
        assert_eq!(vm.as_vm().unwrap().interfaces(), std::slice::from_ref(nic1));
        assert_eq!(
            slice.sliver(vm2).unwrap().allocation_state(),
            AllocationState::Allocated
        );

        let nic = slice.sliver(nic2).unwrap().as_interface().unwrap();
        assert_eq!(nic.virtual_machine(), Some(vm2));
        assert_eq!(nic.link(), Some(lan));
        assert_eq!(nic.ip_address.as_deref(), Some("10.0.1.102"));
        assert_eq!(nic.vlan_tag, Some(1750));

        let link = slice.sliver(lan).unwrap().as_link().unwrap();
        assert_eq!(link.endpoints().len(), 2);
    }

    // The recovered slice keeps working through the lifecycle
    let provisioned = h.manager.provision(&[s1.clone()], &creds, &options).await.unwrap();
    assert!(provisioned
        .geni_slivers
        .iter()
        .all(|s| s.geni_allocation_status == AllocationState::Provisioned));
    h.manager.delete(&[s1], &creds, &options).await.unwrap();
    assert!(h.stitching.is_empty());
}

#[tokio::test]
async fn test_retention_keeps_most_recent_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness_with_store(dir.path(), 2);
    let options = AmOptions::default();

    for name in ["a", "b", "c", "d"] {
        let urn = slice_urn(name);
        h.manager
            .allocate(&urn, &credential(&urn), ONE_VM, &options)
            .await
            .unwrap();
    }

    let store = h.store.as_ref().unwrap();
    let snapshots = store.list().unwrap();
    assert_eq!(snapshots.len(), 2);

    // Newest first, holding all four slices
    let records = store.load(&snapshots[0].name).unwrap();
    for name in ["a", "b", "c", "d"] {
        let urn = slice_urn(name);
        assert!(records.iter().any(|r| r.urn() == urn.as_str()));
    }
}

#[tokio::test]
async fn test_unwritable_snapshot_directory_keeps_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_dir = dir.path().join("snapshots");
    let h = harness_with_store(&snapshot_dir, 3);
    let mut events = h.events.subscribe();
    std::fs::remove_dir_all(&snapshot_dir).unwrap();

    let s1 = slice_urn("s1");
    let creds = credential(&s1);
    let options = AmOptions::default();
    let allocated = h.manager.allocate(&s1, &creds, ONE_VM, &options).await.unwrap();
    assert_eq!(allocated.geni_slivers.len(), 2);
    assert!(h
        .manager
        .registry()
        .contains(&SliceUrn::new_unchecked(s1.as_str())));

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SliceEvent::SnapshotFailed { .. } => failed = true,
            SliceEvent::SnapshotPersisted { .. } => panic!("snapshot written to a missing directory"),
            _ => {}
        }
    }
    assert!(failed);

    // Later operations still see the allocated slice
    let status = h.manager.status(&[s1], &creds, &options).await.unwrap();
    assert_eq!(status.geni_slivers.len(), 2);
}

#[tokio::test]
async fn test_recovery_without_snapshots_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::open(dir.path()).unwrap();
    let stitching = InMemoryStitchingRegistry::new();

    let state = recover(&store, &recover_config(3), &stitching).unwrap();
    assert!(state.slices.is_empty());
    assert!(state.source.is_none());
}
