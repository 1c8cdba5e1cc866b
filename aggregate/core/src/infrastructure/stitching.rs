// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::stitching::{StitchingError, StitchingReservation, StitchingService};
use crate::domain::urn::SliverUrn;

#[derive(Default)]
struct Reservations {
    by_sliver: HashMap<SliverUrn, StitchingReservation>,
    by_vlan: HashMap<(String, u16), SliverUrn>,
}

/// In-memory VLAN reservation table keyed by sliver and by (port, tag)
#[derive(Default)]
pub struct InMemoryStitchingRegistry {
    inner: RwLock<Reservations>,
}

impl InMemoryStitchingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_sliver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_sliver.is_empty()
    }

    fn insert(&self, sliver: &SliverUrn, vlan_tag: u16, port: &str) -> Result<(), StitchingError> {
        if vlan_tag == 0 || vlan_tag > 4094 {
            return Err(StitchingError::InvalidVlan(vlan_tag));
        }

        let mut inner = self.inner.write();
        let key = (port.to_string(), vlan_tag);
        if let Some(holder) = inner.by_vlan.get(&key) {
            if holder != sliver {
                return Err(StitchingError::VlanInUse {
                    vlan_tag,
                    port: port.to_string(),
                    holder: holder.clone(),
                });
            }
        }
        if let Some(existing) = inner.by_sliver.get(sliver) {
            if existing.vlan_tag != vlan_tag || existing.port != port {
                return Err(StitchingError::AlreadyReserved(sliver.clone()));
            }
        }

        inner.by_vlan.insert(key, sliver.clone());
        inner.by_sliver.insert(
            sliver.clone(),
            StitchingReservation {
                vlan_tag,
                port: port.to_string(),
            },
        );
        Ok(())
    }
}

impl StitchingService for InMemoryStitchingRegistry {
    fn record_reservation(
        &self,
        sliver: &SliverUrn,
        vlan_tag: u16,
        port: &str,
    ) -> Result<(), StitchingError> {
        self.insert(sliver, vlan_tag, port)?;
        debug!(sliver = %sliver, vlan_tag, port, "Recorded stitching reservation");
        Ok(())
    }

    fn restore_reservation(
        &self,
        sliver: &SliverUrn,
        vlan_tag: u16,
        port: &str,
    ) -> Result<(), StitchingError> {
        self.insert(sliver, vlan_tag, port)?;
        debug!(sliver = %sliver, vlan_tag, port, "Restored stitching reservation");
        Ok(())
    }

    fn lookup_reservation(&self, sliver: &SliverUrn) -> Option<StitchingReservation> {
        self.inner.read().by_sliver.get(sliver).cloned()
    }

    fn release_reservation(&self, sliver: &SliverUrn) -> Option<StitchingReservation> {
        let mut inner = self.inner.write();
        let reservation = inner.by_sliver.remove(sliver)?;
        inner
            .by_vlan
            .remove(&(reservation.port.clone(), reservation.vlan_tag));
        Some(reservation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlan_conflict_detected() {
        let registry = InMemoryStitchingRegistry::new();
        registry
            .record_reservation(&"link-a".into(), 1750, "eth3")
            .unwrap();

        let err = registry
            .record_reservation(&"link-b".into(), 1750, "eth3")
            .unwrap_err();
        assert!(matches!(err, StitchingError::VlanInUse { .. }));

        registry
            .record_reservation(&"link-b".into(), 1750, "eth4")
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_frees_vlan() {
        let registry = InMemoryStitchingRegistry::new();
        registry
            .record_reservation(&"link-a".into(), 1750, "eth3")
            .unwrap();
        assert!(registry.release_reservation(&"link-a".into()).is_some());
        assert!(registry.lookup_reservation(&"link-a".into()).is_none());
        registry
            .record_reservation(&"link-b".into(), 1750, "eth3")
            .unwrap();
    }

    #[test]
    fn test_restore_is_idempotent() {
        let registry = InMemoryStitchingRegistry::new();
        registry
            .restore_reservation(&"link-a".into(), 1750, "eth3")
            .unwrap();
        registry
            .restore_reservation(&"link-a".into(), 1750, "eth3")
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry
            .restore_reservation(&"link-a".into(), 0, "eth3")
            .is_err());
    }
}
