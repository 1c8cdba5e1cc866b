// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end lifecycle tests: Allocate, Provision, Describe, Delete.

mod common;

use common::*;
use gram_core::application::aggregate_manager::AggregateManager;
use gram_core::domain::credential::Privilege;
use gram_core::domain::result::{AmError, AmOptions, OperationResult};
use gram_core::domain::sliver::{AllocationState, OperationalState};
use gram_core::domain::snapshot::SnapshotStore;
use gram_core::domain::urn::{SliceUrn, SliverType};
use std::sync::Arc;

#[tokio::test]
async fn test_allocate_provision_delete_single_vm() {
    let h = harness();
    let s1 = slice_urn("s1");
    let creds = credential(&s1);
    let options = AmOptions::default();

    // Allocate: one VM sliver with exactly one attached interface
    let allocated = h.manager.allocate(&s1, &creds, ONE_VM, &options).await.unwrap();
    assert_eq!(allocated.geni_slivers.len(), 2);
    assert!(allocated
        .geni_slivers
        .iter()
        .all(|s| s.geni_allocation_status == AllocationState::Allocated));
    {
        let handle = h.manager.registry().get(&SliceUrn::new_unchecked(s1.as_str())).unwrap();
        let slice = handle.lock().await;
        let vms: Vec<_> = slice.slivers_of_type(SliverType::VirtualMachine).collect();
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].as_vm().unwrap().interfaces().len(), 1);
    }

    // Provision: VM becomes Provisioned/NotReady with backend addressing
    let provisioned = h.manager.provision(&[s1.clone()], &creds, &options).await.unwrap();
    assert!(provisioned.geni_slivers.iter().all(|s| {
        s.geni_allocation_status == AllocationState::Provisioned
            && s.geni_operational_status == OperationalState::NotReady
    }));
    assert!(provisioned.geni_rspec.contains("192.168.10.2"));
    assert!(provisioned.geni_rspec.contains("fa:16:3e:"));
    assert_eq!(h.backend.resource_count(), 2);

    // Delete: slice gone, backend resources released
    let deleted = h.manager.delete(&[s1.clone()], &creds, &options).await.unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.iter().all(|s| s.geni_error.is_empty()));
    assert!(!h.manager.registry().contains(&SliceUrn::new_unchecked(s1.as_str())));
    assert_eq!(h.backend.resource_count(), 0);

    let err = h.manager.describe(&[s1], &creds, &options).await.unwrap_err();
    assert!(matches!(err, AmError::UnknownSlice(_)));
    assert_eq!(OperationResult::<()>::failure(&err).code.geni_code, 12);
}

#[tokio::test]
async fn test_snapshot_after_delete_has_no_trace_of_slice() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness_with_store(dir.path(), 10);
    let s1 = slice_urn("s1");
    let keep = slice_urn("keep");
    let options = AmOptions::default();

    let gone = h
        .manager
        .allocate(&s1, &credential(&s1), TWO_VM_LAN, &options)
        .await
        .unwrap();
    h.manager
        .allocate(&keep, &credential(&keep), ONE_VM, &options)
        .await
        .unwrap();
    h.manager.delete(&[s1.clone()], &credential(&s1), &options).await.unwrap();

    let store = h.store.as_ref().unwrap();
    let latest = store.latest().unwrap().unwrap();
    let records = store.load(&latest.name).unwrap();
    let text = std::fs::read_to_string(&latest.path).unwrap();

    assert!(!text.contains(s1.as_str()));
    for status in &gone.geni_slivers {
        assert!(records.iter().all(|r| r.urn() != status.geni_sliver_urn.as_str()));
    }
    assert!(records.iter().any(|r| r.urn() == keep.as_str()));
    assert!(h.stitching.is_empty());
}

#[tokio::test]
async fn test_allocate_existing_slice_fails() {
    let h = harness();
    let s1 = slice_urn("s1");
    let options = AmOptions::default();
    h.manager.allocate(&s1, &credential(&s1), ONE_VM, &options).await.unwrap();

    let err = h
        .manager
        .allocate(&s1, &credential(&s1), ONE_VM, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, AmError::SliceAlreadyExists(_)));
    assert_eq!(err.code(), 17);
}

#[tokio::test]
async fn test_concurrent_allocate_only_one_wins() {
    let h = Arc::new(harness());
    let s1 = slice_urn("race");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let s1 = s1.clone();
        tasks.push(tokio::spawn(async move {
            h.manager
                .allocate(&s1, &credential(&s1), ONE_VM, &AmOptions::default())
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, AmError::SliceAlreadyExists(_))),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(h.manager.registry().len(), 1);
}

#[tokio::test]
async fn test_bad_descriptor_leaves_no_slice() {
    let h = harness();
    let s1 = slice_urn("s1");
    let err = h
        .manager
        .allocate(&s1, &credential(&s1), "nodes: [unclosed", &AmOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AmError::RequestParseFailed(_)));
    assert!(h.manager.registry().is_empty());
}

#[tokio::test]
async fn test_authorization_is_scoped_to_slice_and_privilege() {
    let h = harness();
    let s1 = slice_urn("s1");
    let options = AmOptions::default();

    let other = credential(&slice_urn("other"));
    let err = h.manager.allocate(&s1, &other, ONE_VM, &options).await.unwrap_err();
    assert!(matches!(err, AmError::Authorization(_)));

    let status_only = credential_for(&s1, &[Privilege::SliverStatus], chrono::Duration::hours(1));
    let err = h.manager.allocate(&s1, &status_only, ONE_VM, &options).await.unwrap_err();
    assert_eq!(err.code(), 3);
    assert!(h.manager.registry().is_empty());
}

#[tokio::test]
async fn test_allocate_existing_slice_requires_authorization_first() {
    let h = harness();
    let s1 = slice_urn("s1");
    let options = AmOptions::default();
    h.manager.allocate(&s1, &credential(&s1), ONE_VM, &options).await.unwrap();

    // A caller without rights on s1 learns nothing about it
    let other = credential(&slice_urn("other"));
    let err = h.manager.allocate(&s1, &other, ONE_VM, &options).await.unwrap_err();
    assert_eq!(err.code(), 3);

    let err = h
        .manager
        .allocate(&s1, &credential(&s1), ONE_VM, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, AmError::SliceAlreadyExists(_)));
    assert_eq!(err.code(), 17);
}

#[tokio::test]
async fn test_provision_backend_failure_changes_nothing() {
    let h = harness();
    let s1 = slice_urn("s1");
    let creds = credential(&s1);
    let options = AmOptions::default();
    h.manager.allocate(&s1, &creds, ONE_VM, &options).await.unwrap();

    h.backend.fail_provisioning(Some("hypervisor offline"));
    let err = h.manager.provision(&[s1.clone()], &creds, &options).await.unwrap_err();
    assert!(matches!(err, AmError::BackendFailure(_)));

    let status = h.manager.status(&[s1.clone()], &creds, &options).await.unwrap();
    assert!(status
        .geni_slivers
        .iter()
        .all(|s| s.geni_allocation_status == AllocationState::Allocated));

    h.backend.fail_provisioning(None);
    h.manager.provision(&[s1], &creds, &options).await.unwrap();
}

#[tokio::test]
async fn test_delete_reports_partial_teardown() {
    let h = harness();
    let s1 = slice_urn("s1");
    let creds = credential(&s1);
    let options = AmOptions::default();
    let allocated = h.manager.allocate(&s1, &creds, TWO_VM_LAN, &options).await.unwrap();
    h.manager.provision(&[s1.clone()], &creds, &options).await.unwrap();

    let stuck = allocated.geni_slivers[0].geni_sliver_urn.clone();
    h.backend.fail_teardown_for(stuck.clone());

    let deleted = h.manager.delete(&[s1.clone()], &creds, &options).await.unwrap();
    let failed: Vec<_> = deleted.iter().filter(|s| !s.geni_error.is_empty()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].geni_sliver_urn, stuck);
    assert!(deleted
        .iter()
        .all(|s| s.geni_allocation_status == AllocationState::Unallocated));

    // Every other resource was still torn down and the slice is gone
    assert_eq!(h.backend.resource_count(), 1);
    assert!(h.manager.registry().is_empty());
}

#[tokio::test]
async fn test_resolver_accepts_sliver_subsets() {
    let h = harness();
    let s1 = slice_urn("s1");
    let s2 = slice_urn("s2");
    let options = AmOptions::default();
    let first = h.manager.allocate(&s1, &credential(&s1), TWO_VM_LAN, &options).await.unwrap();
    let second = h.manager.allocate(&s2, &credential(&s2), ONE_VM, &options).await.unwrap();

    let picked = vec![
        first.geni_slivers[0].geni_sliver_urn.to_string(),
        first.geni_slivers[1].geni_sliver_urn.to_string(),
    ];
    let status = h.manager.status(&picked, &credential(&s1), &options).await.unwrap();
    assert_eq!(status.geni_slivers.len(), 2);
    assert_eq!(status.geni_urn, s1);

    let mixed = vec![
        first.geni_slivers[0].geni_sliver_urn.to_string(),
        second.geni_slivers[0].geni_sliver_urn.to_string(),
    ];
    let err = h.manager.status(&mixed, &credential(&s1), &options).await.unwrap_err();
    assert!(matches!(err, AmError::BadArgs(_)));

    let err = h.manager.status(&[], &credential(&s1), &options).await.unwrap_err();
    assert!(matches!(err, AmError::BadArgs(_)));

    let unknown = vec!["urn:publicid:IDN+geni.net:gram+sliver+vm-missing".to_string()];
    let err = h.manager.status(&unknown, &credential(&s1), &options).await.unwrap_err();
    assert!(matches!(err, AmError::UnknownSlice(_)));
}

#[tokio::test]
async fn test_list_resources_and_version() {
    let h = harness();
    let s1 = slice_urn("s1");
    let creds = credential(&s1);

    let version = h.manager.get_version().await;
    assert_eq!(version.geni_api, 3);
    assert_eq!(version.operational_actions, vec!["geni_start", "geni_restart", "geni_stop"]);

    let advertisement = h
        .manager
        .list_resources(&creds, &AmOptions::default())
        .await
        .unwrap();
    assert!(advertisement.contains("m1.small"));

    let compressed = h
        .manager
        .list_resources(
            &creds,
            &AmOptions {
                geni_compressed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_ne!(compressed, advertisement);
    assert!(!compressed.contains("m1.small"));

    h.manager.allocate(&s1, &creds, ONE_VM, &AmOptions::default()).await.unwrap();
    let manifest = h
        .manager
        .list_resources(
            &creds,
            &AmOptions {
                geni_slice_urn: Some(s1.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(manifest.contains("client_id: vm1"));
}
