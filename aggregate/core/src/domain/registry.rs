// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Slice registry and URN resolver
//!
//! The registry is the only authoritative state of the aggregate. It maps
//! slice URNs to per-slice locks and keeps a sliver-to-slice index for
//! resolving sliver URNs. The index lock is synchronous and never held across
//! an await; all graph mutation happens under the per-slice `tokio` mutex.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::result::AmError;
use crate::domain::slice::Slice;
use crate::domain::urn::{SliceUrn, SliverUrn};

/// Shared handle to one slice; lock it to read or mutate the slice graph
pub type SliceHandle = Arc<Mutex<Slice>>;

#[derive(Default)]
struct RegistryIndex {
    slices: IndexMap<SliceUrn, SliceHandle>,
    owners: HashMap<SliverUrn, SliceUrn>,
}

/// Which slivers of the resolved slice an operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliverSelection {
    /// Every sliver the slice holds when the lock is taken
    All,
    Named(Vec<SliverUrn>),
}

/// Outcome of URN resolution
#[derive(Clone)]
pub struct ResolvedTarget {
    pub slice_urn: SliceUrn,
    pub handle: SliceHandle,
    pub selection: SliverSelection,
}

impl ResolvedTarget {
    /// Sliver URNs the operation applies to, evaluated against the locked slice
    pub fn sliver_urns(&self, slice: &Slice) -> Vec<SliverUrn> {
        match &self.selection {
            SliverSelection::All => slice.sliver_urns(),
            SliverSelection::Named(urns) => urns
                .iter()
                .filter(|u| slice.contains(u))
                .cloned()
                .collect(),
        }
    }
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("slice_urn", &self.slice_urn)
            .field("selection", &self.selection)
            .finish()
    }
}

#[derive(Default)]
pub struct SliceRegistry {
    inner: RwLock<RegistryIndex>,
}

impl SliceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from recovered slices
    pub fn from_slices(slices: IndexMap<SliceUrn, Slice>) -> Self {
        let mut index = RegistryIndex::default();
        for (urn, slice) in slices {
            for sliver in slice.sliver_urns() {
                index.owners.insert(sliver, urn.clone());
            }
            index.slices.insert(urn, Arc::new(Mutex::new(slice)));
        }
        Self {
            inner: RwLock::new(index),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().slices.is_empty()
    }

    pub fn get(&self, urn: &SliceUrn) -> Option<SliceHandle> {
        self.inner.read().slices.get(urn).cloned()
    }

    pub fn contains(&self, urn: &SliceUrn) -> bool {
        self.inner.read().slices.contains_key(urn)
    }

    pub fn owner_of(&self, sliver: &SliverUrn) -> Option<SliceUrn> {
        self.inner.read().owners.get(sliver).cloned()
    }

    /// All live slices in registration order
    pub fn handles(&self) -> Vec<(SliceUrn, SliceHandle)> {
        self.inner
            .read()
            .slices
            .iter()
            .map(|(urn, handle)| (urn.clone(), handle.clone()))
            .collect()
    }

    /// Register a freshly built slice.
    ///
    /// The existence check and the insert happen under one write lock, so two
    /// concurrent Allocate calls for the same URN cannot both succeed. An
    /// existing entry that holds no slivers and is not in use is replaced.
    pub fn insert_new(&self, slice: Slice) -> Result<SliceHandle, AmError> {
        let urn = slice.urn().clone();
        let mut index = self.inner.write();

        if let Some(existing) = index.slices.get(&urn) {
            let reusable = existing
                .try_lock()
                .map(|guard| guard.is_empty())
                .unwrap_or(false);
            if !reusable {
                return Err(AmError::SliceAlreadyExists(urn.to_string()));
            }
        }

        let slivers = slice.sliver_urns();
        if let Some(taken) = slivers.iter().find(|s| index.owners.contains_key(*s)) {
            return Err(AmError::BadArgs(format!("sliver URN already in use: {}", taken)));
        }

        for sliver in slivers {
            index.owners.insert(sliver, urn.clone());
        }
        let handle = Arc::new(Mutex::new(slice));
        index.slices.insert(urn.clone(), handle.clone());
        debug!(slice = %urn, "Registered slice");
        Ok(handle)
    }

    /// Whether `handle` is still the registered entry for `urn`
    pub fn is_current(&self, urn: &SliceUrn, handle: &SliceHandle) -> bool {
        self.inner
            .read()
            .slices
            .get(urn)
            .map(|h| Arc::ptr_eq(h, handle))
            .unwrap_or(false)
    }

    /// Remove the slice and every sliver index entry pointing at it.
    /// Only removes the entry if it is still `handle`.
    pub fn remove(&self, urn: &SliceUrn, handle: &SliceHandle) -> bool {
        let mut index = self.inner.write();
        let current = index
            .slices
            .get(urn)
            .map(|h| Arc::ptr_eq(h, handle))
            .unwrap_or(false);
        if !current {
            return false;
        }
        index.slices.shift_remove(urn);
        index.owners.retain(|_, owner| owner != urn);
        debug!(slice = %urn, "Removed slice from registry");
        true
    }

    /// Map a client URN list onto one slice and a subset of its slivers.
    ///
    /// - a single known slice URN selects the whole slice
    /// - otherwise every URN must name a sliver of the slice owning the first one
    pub fn resolve(&self, urns: &[String]) -> Result<ResolvedTarget, AmError> {
        if urns.is_empty() {
            return Err(AmError::BadArgs("no URNs supplied".to_string()));
        }

        let index = self.inner.read();

        if urns.len() == 1 {
            let candidate = SliceUrn::new_unchecked(urns[0].as_str());
            if let Some(handle) = index.slices.get(&candidate) {
                debug!(slice = %candidate, "Resolved slice URN");
                return Ok(ResolvedTarget {
                    slice_urn: candidate,
                    handle: handle.clone(),
                    selection: SliverSelection::All,
                });
            }
        }

        if let Some(slice_urn) = urns
            .iter()
            .find(|u| index.slices.contains_key(&SliceUrn::new_unchecked(u.as_str())))
        {
            return Err(AmError::BadArgs(format!(
                "slice URN {} cannot be combined with other URNs",
                slice_urn
            )));
        }

        let first = SliverUrn::new(urns[0].as_str());
        let owner = index
            .owners
            .get(&first)
            .cloned()
            .ok_or_else(|| AmError::UnknownSlice(urns[0].clone()))?;

        let mut seen = HashSet::new();
        let mut named = Vec::with_capacity(urns.len());
        for urn in urns {
            let sliver = SliverUrn::new(urn.as_str());
            match index.owners.get(&sliver) {
                Some(o) if o == &owner => {
                    if seen.insert(sliver.clone()) {
                        named.push(sliver);
                    }
                }
                _ => {
                    return Err(AmError::BadArgs(format!(
                        "{} is not part of slice {}",
                        urn, owner
                    )))
                }
            }
        }

        let handle = index
            .slices
            .get(&owner)
            .cloned()
            .ok_or_else(|| AmError::UnknownSlice(owner.to_string()))?;

        debug!(slice = %owner, slivers = named.len(), "Resolved sliver URNs");
        Ok(ResolvedTarget {
            slice_urn: owner,
            handle,
            selection: SliverSelection::Named(named),
        })
    }
}
