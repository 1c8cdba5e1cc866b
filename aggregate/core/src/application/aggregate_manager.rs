// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle orchestrator
//!
//! Every operation runs the lazy expiration sweep, resolves its URNs,
//! authorizes against the resolved slice, and mutates the graph under that
//! slice's lock. After the lock is released the event is published and a
//! snapshot is written. Snapshots are built from the last committed copy of
//! each slice, so persisting never waits on a slice that is busy.
//!
//! Snapshot failures are logged and published as events; they never fail
//! the operation that triggered them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use flate2::{write::ZlibEncoder, Compression};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::allocation::SliceBuilder;
use crate::application::authorization::AuthorizationGate;
use crate::application::expiry::ExpirationPolicy;
use crate::application::manifest::ManifestRenderer;
use crate::domain::aggregate_config::AggregateConfigManifest;
use crate::domain::backend::{ComputeBackend, Flavor, TeardownReport};
use crate::domain::credential::{Credential, CredentialVerifier, Privilege};
use crate::domain::descriptor::DescriptorParser;
use crate::domain::events::SliceEvent;
use crate::domain::registry::{ResolvedTarget, SliceRegistry, SliverSelection};
use crate::domain::result::{AmError, AmOptions};
use crate::domain::slice::Slice;
use crate::domain::sliver::{AllocationState, OperationalState, Sliver, SliverStatus};
use crate::domain::snapshot::{self, SnapshotError, SnapshotInfo, SnapshotStore};
use crate::domain::state_machine::{shutdown_slice, ActionError, ActionPlan, OperationalAction};
use crate::domain::stitching::StitchingService;
use crate::domain::urn::{SliceUrn, SliverType, SliverUrn, UrnAuthority};
use crate::infrastructure::event_bus::EventBus;

pub const GENI_API_VERSION: u32 = 3;
pub const REQUEST_FORMAT: &str = "gram-request-yaml/1";
pub const ADVERTISEMENT_FORMAT: &str = "gram-advertisement-yaml/1";

// ============================================================================
// Responses
// ============================================================================

/// Value of Allocate and Provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResponse {
    pub geni_rspec: String,
    pub geni_slivers: Vec<SliverStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub geni_rspec: String,
    pub geni_urn: String,
    pub geni_slivers: Vec<SliverStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub geni_urn: String,
    pub geni_slivers: Vec<SliverStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub geni_api: u32,
    pub geni_am_urn: String,
    pub geni_request_rspec_versions: Vec<String>,
    pub geni_ad_rspec_versions: Vec<String>,
    pub geni_credential_types: Vec<String>,
    pub geni_single_allocation: bool,
    pub geni_allocate: String,
    pub operational_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Advertisement<'a> {
    aggregate_urn: &'a str,
    flavors: &'a [Flavor],
}

// ============================================================================
// Service Interface
// ============================================================================

#[async_trait]
pub trait AggregateManager: Send + Sync {
    async fn get_version(&self) -> VersionInfo;

    async fn list_resources(
        &self,
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<String, AmError>;

    async fn allocate(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
        request: &str,
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError>;

    async fn provision(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError>;

    async fn describe(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<DescribeResponse, AmError>;

    async fn status(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<StatusResponse, AmError>;

    async fn renew(
        &self,
        urns: &[String],
        credentials: &[Credential],
        expiration: DateTime<Utc>,
        options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError>;

    async fn perform_operational_action(
        &self,
        urns: &[String],
        credentials: &[Credential],
        action: &str,
        options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError>;

    async fn delete(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError>;

    async fn shutdown(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<bool, AmError>;
}

// ============================================================================
// Settings & Collaborators
// ============================================================================

#[derive(Debug, Clone)]
pub struct AggregateSettings {
    pub authority: UrnAuthority,
    pub aggregate_urn: String,
    pub expiration: ExpirationPolicy,
    pub max_vms_per_slice: u32,
    pub snapshot_retention: usize,
}

impl AggregateSettings {
    pub fn from_manifest(config: &AggregateConfigManifest) -> anyhow::Result<Self> {
        let authority = UrnAuthority::new(config.spec.aggregate.urn_authority.as_str())?;
        let expiration = ExpirationPolicy::from_config(&config.spec.lifecycle)?;
        Ok(Self {
            authority,
            aggregate_urn: config.aggregate_urn(),
            expiration,
            max_vms_per_slice: config.spec.lifecycle.max_vms_per_slice,
            snapshot_retention: config.spec.snapshots.retention,
        })
    }
}

/// External collaborators the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub verifier: Arc<dyn CredentialVerifier>,
    pub backend: Arc<dyn ComputeBackend>,
    pub stitching: Arc<dyn StitchingService>,
    pub parser: Arc<dyn DescriptorParser>,
    /// Persistence is disabled when unset
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
    pub event_bus: EventBus,
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardAggregateManager {
    settings: AggregateSettings,
    registry: Arc<SliceRegistry>,
    gate: AuthorizationGate,
    backend: Arc<dyn ComputeBackend>,
    stitching: Arc<dyn StitchingService>,
    parser: Arc<dyn DescriptorParser>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    event_bus: EventBus,
    /// Last committed copy of every registered slice
    committed: Mutex<HashMap<SliceUrn, Slice>>,
    /// Serializes snapshot writes so a later snapshot never lands before an earlier one
    persist_lock: AsyncMutex<()>,
}

impl StandardAggregateManager {
    pub fn new(
        settings: AggregateSettings,
        registry: Arc<SliceRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let mut committed = HashMap::new();
        for (urn, handle) in registry.handles() {
            match handle.try_lock() {
                Ok(slice) => {
                    committed.insert(urn, slice.clone());
                }
                Err(_) => warn!(slice = %urn, "Slice busy at startup, left out of snapshots until next change"),
            }
        }

        Self {
            settings,
            registry,
            gate: AuthorizationGate::new(collaborators.verifier),
            backend: collaborators.backend,
            stitching: collaborators.stitching,
            parser: collaborators.parser,
            snapshots: collaborators.snapshots,
            event_bus: collaborators.event_bus,
            committed: Mutex::new(committed),
            persist_lock: AsyncMutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<SliceRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn settings(&self) -> &AggregateSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Expiration sweep
    // ------------------------------------------------------------------------

    /// Tear down and remove every slice holding an expired sliver.
    /// Slices locked by another operation are left for the next sweep.
    pub async fn expire_slivers(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;

        for (urn, handle) in self.registry.handles() {
            let Ok(slice) = handle.try_lock() else {
                debug!(slice = %urn, "Slice busy, skipped by expiration sweep");
                continue;
            };
            if !slice.has_expired_slivers(now) || !self.registry.is_current(&urn, &handle) {
                continue;
            }

            let report = self.teardown(&slice).await;
            if !report.is_complete() {
                warn!(
                    slice = %urn,
                    failures = report.failures.len(),
                    "Backend teardown of expired slice was incomplete"
                );
            }
            self.registry.remove(&urn, &handle);
            self.committed.lock().remove(&urn);
            drop(slice);

            info!(slice = %urn, "Expired slice removed");
            self.event_bus.publish(SliceEvent::SliceExpired {
                slice_urn: urn,
                expired_at: now,
            });
            expired += 1;
        }

        if expired > 0 {
            self.persist_state().await;
        }
        expired
    }

    // ------------------------------------------------------------------------
    // Snapshot persistence
    // ------------------------------------------------------------------------

    /// Write a snapshot of every committed slice and apply retention
    pub async fn persist_state(&self) {
        let Some(store) = self.snapshots.clone() else {
            return;
        };
        let _serial = self.persist_lock.lock().await;

        let order = self.registry.handles();
        let slices: Vec<Slice> = {
            let committed = self.committed.lock();
            order
                .iter()
                .filter_map(|(urn, _)| committed.get(urn).cloned())
                .collect()
        };
        let records = snapshot::encode(&slices, self.stitching.as_ref());
        let record_count = records.len();
        let retention = self.settings.snapshot_retention;

        let outcome = tokio::task::spawn_blocking(move || -> Result<SnapshotInfo, SnapshotError> {
            let info = store.persist(&records)?;
            let removed = store.prune(retention)?;
            if !removed.is_empty() {
                debug!(removed = removed.len(), "Pruned old snapshots");
            }
            Ok(info)
        })
        .await;

        let failure = match outcome {
            Ok(Ok(info)) => {
                self.event_bus.publish(SliceEvent::SnapshotPersisted {
                    name: info.name,
                    record_count,
                    persisted_at: Utc::now(),
                });
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("snapshot task failed: {}", e),
        };
        warn!(error = %failure, "Snapshot write failed, in-memory state is unaffected");
        self.event_bus.publish(SliceEvent::SnapshotFailed {
            reason: failure,
            failed_at: Utc::now(),
        });
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn commit(&self, slice: &Slice) {
        self.committed
            .lock()
            .insert(slice.urn().clone(), slice.clone());
    }

    /// Lock the resolved slice, failing if it was removed after resolution
    async fn lock_target(&self, target: &ResolvedTarget) -> Result<OwnedMutexGuard<Slice>, AmError> {
        let guard = target.handle.clone().lock_owned().await;
        if !self.registry.is_current(&target.slice_urn, &target.handle) {
            return Err(AmError::UnknownSlice(target.slice_urn.to_string()));
        }
        Ok(guard)
    }

    fn release_stitching(&self, slice: &Slice) {
        for link in slice.slivers_of_type(SliverType::NetworkLink) {
            if let Some(reservation) = self.stitching.release_reservation(link.urn()) {
                debug!(sliver = %link.urn(), vlan_tag = reservation.vlan_tag, "Released stitching reservation");
            }
        }
    }

    async fn teardown(&self, slice: &Slice) -> TeardownReport {
        let report = self.backend.delete_all_resources_for_slice(slice).await;
        self.release_stitching(slice);
        report
    }

    fn regenerate_manifest(&self, slice: &mut Slice) -> Result<String, AmError> {
        ManifestRenderer::apply(slice, self.stitching.as_ref())
            .map_err(|e| AmError::BackendFailure(e.to_string()))
    }

    fn statuses(slice: &Slice, urns: &[SliverUrn]) -> Vec<SliverStatus> {
        urns.iter()
            .filter_map(|u| slice.sliver(u))
            .map(Sliver::status)
            .collect()
    }

    fn record<T>(operation: &'static str, result: &Result<T, AmError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => {
                warn!(operation, code = e.code(), error = %e, "Operation failed");
                e.label()
            }
        };
        counter!("gram_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    async fn do_allocate(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
        request: &str,
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError> {
        // 1. Resolve and authorize before revealing whether the slice exists
        let urn = SliceUrn::parse(slice_urn).map_err(|e| AmError::BadArgs(e.to_string()))?;
        let auth = self
            .gate
            .authorize(credentials, &[Privilege::Allocate], Some(&urn))
            .await?;

        // 2. Reject a slice that already holds slivers
        if let Some(existing) = self.registry.get(&urn) {
            let in_use = existing
                .try_lock()
                .map(|slice| !slice.is_empty())
                .unwrap_or(true);
            if in_use {
                return Err(AmError::SliceAlreadyExists(urn.to_string()));
            }
        }

        // 3. Build the slice off-registry
        let descriptor = self
            .parser
            .parse(request)
            .map_err(|e| AmError::RequestParseFailed(e.to_string()))?;
        let now = Utc::now();
        let expires_at =
            self.settings
                .expiration
                .allocation_expiry(now, options.geni_end_time, auth.expires_at)?;

        let mut slice = Slice::new(urn.clone(), auth.caller_urn.clone());
        slice.expires_at = expires_at;
        slice.tenant_name = Some(urn.name().to_string());
        slice.tenant_uuid = Some(Uuid::new_v4().to_string());
        slice.request = Some(request.to_string());

        SliceBuilder::new(
            &self.settings.authority,
            self.stitching.as_ref(),
            self.settings.max_vms_per_slice,
            expires_at,
        )
        .build(&mut slice, &descriptor)?;

        let geni_rspec = match self.regenerate_manifest(&mut slice) {
            Ok(text) => text,
            Err(e) => {
                self.release_stitching(&slice);
                return Err(e);
            }
        };
        let geni_slivers: Vec<SliverStatus> = slice.slivers().map(Sliver::status).collect();
        let released = slice.clone();

        // 4. Register; the existence check is repeated under the registry lock
        let handle = match self.registry.insert_new(slice) {
            Ok(handle) => handle,
            Err(e) => {
                self.release_stitching(&released);
                return Err(e);
            }
        };
        {
            let slice = handle.lock().await;
            self.commit(&slice);
        }

        info!(
            slice = %urn,
            owner = %auth.caller_urn,
            slivers = geni_slivers.len(),
            expires_at = %expires_at,
            "Allocated slice"
        );
        self.event_bus.publish(SliceEvent::SliceAllocated {
            slice_urn: urn,
            owner_urn: auth.caller_urn,
            sliver_count: geni_slivers.len(),
            expires_at,
            allocated_at: now,
        });
        self.persist_state().await;

        Ok(ManifestResponse {
            geni_rspec,
            geni_slivers,
        })
    }

    async fn do_provision(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError> {
        let target = self.registry.resolve(urns)?;
        let auth = self
            .gate
            .authorize(credentials, &[Privilege::Provision], Some(&target.slice_urn))
            .await?;

        let mut slice = self.lock_target(&target).await?;
        let selected: Vec<_> = target
            .sliver_urns(&slice)
            .into_iter()
            .filter(|u| {
                slice
                    .sliver(u)
                    .map(|s| s.allocation_state() == AllocationState::Allocated)
                    .unwrap_or(false)
            })
            .collect();
        if selected.is_empty() {
            return Err(AmError::BadArgs(format!(
                "no allocated slivers to provision in {}",
                target.slice_urn
            )));
        }

        let now = Utc::now();
        let expires_at =
            self.settings
                .expiration
                .provision_expiry(now, options.geni_end_time, auth.expires_at)?;

        // Backend call runs under this slice's lock only
        let report = self
            .backend
            .provision_resources(&slice, &selected, &options.geni_users)
            .await
            .map_err(|e| {
                error!(slice = %target.slice_urn, error = %e, "Backend provisioning failed");
                AmError::BackendFailure(e.to_string())
            })?;

        for (urn, assignment) in report.vms {
            if let Some(vm) = slice.sliver_mut(&urn).and_then(|s| s.as_vm_mut()) {
                vm.host = Some(assignment.host);
                vm.mgmt_address = Some(assignment.mgmt_address);
            }
        }
        for (urn, assignment) in report.interfaces {
            if let Some(nic) = slice.sliver_mut(&urn).and_then(|s| s.as_interface_mut()) {
                nic.mac_address = Some(assignment.mac_address);
            }
        }
        for (urn, assignment) in report.links {
            if let Some(link) = slice.sliver_mut(&urn).and_then(|s| s.as_link_mut()) {
                link.network_uuid = Some(assignment.network_uuid);
                link.subnet_uuid = Some(assignment.subnet_uuid);
            }
        }
        for urn in &selected {
            if let Some(sliver) = slice.sliver_mut(urn) {
                sliver
                    .mark_provisioned()
                    .map_err(|e| AmError::BadArgs(e.to_string()))?;
                sliver.expires_at = expires_at;
            }
        }
        slice.refresh_expiration();
        let geni_rspec = self.regenerate_manifest(&mut slice)?;
        let geni_slivers = Self::statuses(&slice, &selected);
        self.commit(&slice);
        drop(slice);

        info!(slice = %target.slice_urn, slivers = selected.len(), "Provisioned slivers");
        self.event_bus.publish(SliceEvent::SliceProvisioned {
            slice_urn: target.slice_urn.clone(),
            sliver_count: selected.len(),
            provisioned_at: now,
        });
        self.persist_state().await;

        Ok(ManifestResponse {
            geni_rspec,
            geni_slivers,
        })
    }

    async fn do_describe(
        &self,
        urns: &[String],
        credentials: &[Credential],
    ) -> Result<DescribeResponse, AmError> {
        let target = self.registry.resolve(urns)?;
        self.gate
            .authorize(credentials, &[Privilege::SliverStatus], Some(&target.slice_urn))
            .await?;

        let mut slice = self.lock_target(&target).await?;
        let reported = self
            .backend
            .update_operational_status(&slice)
            .await
            .map_err(|e| AmError::BackendFailure(e.to_string()))?;

        let mut changed = false;
        for (urn, state) in reported {
            let Some(sliver) = slice.sliver_mut(&urn) else {
                continue;
            };
            if sliver.operational_state() == state {
                continue;
            }
            match sliver.set_operational_state(state) {
                Ok(()) => changed = true,
                Err(e) => debug!(sliver = %urn, error = %e, "Ignoring backend status"),
            }
        }

        let geni_rspec = match slice.manifest.clone() {
            Some(text) if !changed => text,
            _ => self.regenerate_manifest(&mut slice)?,
        };
        let selected = target.sliver_urns(&slice);
        let geni_slivers = Self::statuses(&slice, &selected);
        if changed {
            self.commit(&slice);
        }
        drop(slice);

        if changed {
            self.persist_state().await;
        }
        Ok(DescribeResponse {
            geni_rspec,
            geni_urn: target.slice_urn.to_string(),
            geni_slivers,
        })
    }

    async fn do_status(
        &self,
        urns: &[String],
        credentials: &[Credential],
    ) -> Result<StatusResponse, AmError> {
        let target = self.registry.resolve(urns)?;
        self.gate
            .authorize(credentials, &[Privilege::SliverStatus], Some(&target.slice_urn))
            .await?;

        let slice = self.lock_target(&target).await?;
        let selected = target.sliver_urns(&slice);
        Ok(StatusResponse {
            geni_urn: target.slice_urn.to_string(),
            geni_slivers: Self::statuses(&slice, &selected),
        })
    }

    async fn do_renew(
        &self,
        urns: &[String],
        credentials: &[Credential],
        expiration: DateTime<Utc>,
    ) -> Result<Vec<SliverStatus>, AmError> {
        let target = self.registry.resolve(urns)?;
        let auth = self
            .gate
            .authorize(credentials, &[Privilege::RenewSliver], Some(&target.slice_urn))
            .await?;

        let mut slice = self.lock_target(&target).await?;
        let selected = target.sliver_urns(&slice);
        let now = Utc::now();

        // Every sliver is checked before any is changed
        for urn in &selected {
            if let Some(sliver) = slice.sliver(urn) {
                self.settings
                    .expiration
                    .check_renewal(now, expiration, auth.expires_at, sliver.expires_at)?;
            }
        }
        for urn in &selected {
            if let Some(sliver) = slice.sliver_mut(urn) {
                sliver.expires_at = expiration;
            }
        }
        slice.refresh_expiration();
        let statuses = Self::statuses(&slice, &selected);
        let expires_at = slice.expires_at;
        self.commit(&slice);
        drop(slice);

        info!(slice = %target.slice_urn, slivers = selected.len(), expires_at = %expiration, "Renewed slivers");
        self.event_bus.publish(SliceEvent::SliceRenewed {
            slice_urn: target.slice_urn.clone(),
            expires_at,
            renewed_at: now,
        });
        self.persist_state().await;
        Ok(statuses)
    }

    async fn do_perform_operational_action(
        &self,
        urns: &[String],
        credentials: &[Credential],
        action: &str,
        options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError> {
        let target = self.registry.resolve(urns)?;
        self.gate
            .authorize(
                credentials,
                &[Privilege::PerformOperationalAction],
                Some(&target.slice_urn),
            )
            .await?;
        let action: OperationalAction = action
            .parse()
            .map_err(|e: ActionError| AmError::Unsupported(e.to_string()))?;

        // Check and apply under the same lock
        let mut slice = self.lock_target(&target).await?;
        let selected = target.sliver_urns(&slice);
        let plan = ActionPlan::evaluate(&slice, &selected, action);
        if plan.has_rejections() && !options.geni_best_effort {
            return Err(AmError::Unsupported(plan.rejection_summary()));
        }

        let applied = plan.eligible().len();
        let rejected = plan.rejected().len();
        let statuses = plan
            .apply(&mut slice)
            .map_err(|e| AmError::Unsupported(e.to_string()))?;
        if applied > 0 {
            self.regenerate_manifest(&mut slice)?;
        }
        self.commit(&slice);
        drop(slice);

        info!(
            slice = %target.slice_urn,
            action = %action,
            applied,
            rejected,
            "Performed operational action"
        );
        self.event_bus.publish(SliceEvent::ActionPerformed {
            slice_urn: target.slice_urn.clone(),
            action,
            applied,
            rejected,
            performed_at: Utc::now(),
        });
        if applied > 0 {
            self.persist_state().await;
        }
        Ok(statuses)
    }

    async fn do_delete(
        &self,
        urns: &[String],
        credentials: &[Credential],
    ) -> Result<Vec<SliverStatus>, AmError> {
        let target = self.registry.resolve(urns)?;
        self.gate
            .authorize(credentials, &[Privilege::DeleteSliver], Some(&target.slice_urn))
            .await?;

        let slice = self.lock_target(&target).await?;
        let report = self.teardown(&slice).await;
        if !report.is_complete() {
            warn!(
                slice = %target.slice_urn,
                failures = report.failures.len(),
                "Backend teardown incomplete, removing slice anyway"
            );
        }

        let statuses: Vec<SliverStatus> = slice
            .slivers()
            .map(|s| SliverStatus {
                geni_sliver_urn: s.urn().clone(),
                geni_expires: s.expires_at,
                geni_allocation_status: AllocationState::Unallocated,
                geni_operational_status: OperationalState::PendingAllocation,
                geni_error: report.failure_for(s.urn()).unwrap_or_default().to_string(),
            })
            .collect();

        self.registry.remove(&target.slice_urn, &target.handle);
        self.committed.lock().remove(&target.slice_urn);
        drop(slice);

        info!(slice = %target.slice_urn, slivers = statuses.len(), "Deleted slice");
        self.event_bus.publish(SliceEvent::SliceDeleted {
            slice_urn: target.slice_urn.clone(),
            teardown_failures: report.failures.len(),
            deleted_at: Utc::now(),
        });
        self.persist_state().await;
        Ok(statuses)
    }

    async fn do_shutdown(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
    ) -> Result<bool, AmError> {
        let target = self.registry.resolve(&[slice_urn.to_string()])?;
        if let SliverSelection::Named(_) = target.selection {
            return Err(AmError::BadArgs(format!("{} is not a slice URN", slice_urn)));
        }
        self.gate
            .authorize(credentials, &[Privilege::Shutdown], Some(&target.slice_urn))
            .await?;

        let mut slice = self.lock_target(&target).await?;
        let statuses = shutdown_slice(&mut slice);
        self.regenerate_manifest(&mut slice)?;
        self.commit(&slice);
        drop(slice);

        info!(slice = %target.slice_urn, slivers = statuses.len(), "Slice shut down");
        self.event_bus.publish(SliceEvent::SliceShutDown {
            slice_urn: target.slice_urn.clone(),
            shut_down_at: Utc::now(),
        });
        self.persist_state().await;
        Ok(true)
    }

    async fn do_list_resources(
        &self,
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<String, AmError> {
        if let Some(slice_urn) = &options.geni_slice_urn {
            let described = self.do_describe(&[slice_urn.clone()], credentials).await?;
            return Self::maybe_compress(described.geni_rspec, options.geni_compressed);
        }

        self.gate.authorize(credentials, &[], None).await?;
        let flavors = self
            .backend
            .list_flavors()
            .await
            .map_err(|e| AmError::BackendFailure(e.to_string()))?;
        let advertisement = serde_yaml::to_string(&Advertisement {
            aggregate_urn: &self.settings.aggregate_urn,
            flavors: &flavors,
        })
        .map_err(|e| AmError::BackendFailure(e.to_string()))?;
        Self::maybe_compress(advertisement, options.geni_compressed)
    }

    fn maybe_compress(text: String, compressed: bool) -> Result<String, AmError> {
        if !compressed {
            return Ok(text);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(text.as_bytes())
            .and_then(|_| encoder.finish())
            .map(|bytes| BASE64.encode(bytes))
            .map_err(|e| AmError::BackendFailure(format!("compression failed: {}", e)))
    }
}

#[async_trait]
impl AggregateManager for StandardAggregateManager {
    async fn get_version(&self) -> VersionInfo {
        counter!("gram_operations_total", "operation" => "get_version", "outcome" => "success")
            .increment(1);
        VersionInfo {
            geni_api: GENI_API_VERSION,
            geni_am_urn: self.settings.aggregate_urn.clone(),
            geni_request_rspec_versions: vec![REQUEST_FORMAT.to_string()],
            geni_ad_rspec_versions: vec![ADVERTISEMENT_FORMAT.to_string()],
            geni_credential_types: vec![crate::infrastructure::dev_credentials::DEV_CREDENTIAL_TYPE.to_string()],
            geni_single_allocation: true,
            geni_allocate: "geni_disjoint".to_string(),
            operational_actions: OperationalAction::ALL
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }

    async fn list_resources(
        &self,
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<String, AmError> {
        self.expire_slivers().await;
        let result = self.do_list_resources(credentials, options).await;
        Self::record("list_resources", &result);
        result
    }

    async fn allocate(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
        request: &str,
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError> {
        self.expire_slivers().await;
        let result = self
            .do_allocate(slice_urn, credentials, request, options)
            .await;
        Self::record("allocate", &result);
        result
    }

    async fn provision(
        &self,
        urns: &[String],
        credentials: &[Credential],
        options: &AmOptions,
    ) -> Result<ManifestResponse, AmError> {
        self.expire_slivers().await;
        let result = self.do_provision(urns, credentials, options).await;
        Self::record("provision", &result);
        result
    }

    async fn describe(
        &self,
        urns: &[String],
        credentials: &[Credential],
        _options: &AmOptions,
    ) -> Result<DescribeResponse, AmError> {
        self.expire_slivers().await;
        let result = self.do_describe(urns, credentials).await;
        Self::record("describe", &result);
        result
    }

    async fn status(
        &self,
        urns: &[String],
        credentials: &[Credential],
        _options: &AmOptions,
    ) -> Result<StatusResponse, AmError> {
        self.expire_slivers().await;
        let result = self.do_status(urns, credentials).await;
        Self::record("status", &result);
        result
    }

    async fn renew(
        &self,
        urns: &[String],
        credentials: &[Credential],
        expiration: DateTime<Utc>,
        _options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError> {
        self.expire_slivers().await;
        let result = self.do_renew(urns, credentials, expiration).await;
        Self::record("renew", &result);
        result
    }

    async fn perform_operational_action(
        &self,
        urns: &[String],
        credentials: &[Credential],
        action: &str,
        options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError> {
        self.expire_slivers().await;
        let result = self
            .do_perform_operational_action(urns, credentials, action, options)
            .await;
        Self::record("perform_operational_action", &result);
        result
    }

    async fn delete(
        &self,
        urns: &[String],
        credentials: &[Credential],
        _options: &AmOptions,
    ) -> Result<Vec<SliverStatus>, AmError> {
        self.expire_slivers().await;
        let result = self.do_delete(urns, credentials).await;
        Self::record("delete", &result);
        result
    }

    async fn shutdown(
        &self,
        slice_urn: &str,
        credentials: &[Credential],
        _options: &AmOptions,
    ) -> Result<bool, AmError> {
        self.expire_slivers().await;
        let result = self.do_shutdown(slice_urn, credentials).await;
        Self::record("shutdown", &result);
        result
    }
}
