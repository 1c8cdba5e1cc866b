// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-aggregate VLAN stitching bookkeeping

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::urn::SliverUrn;

/// VLAN tag and switch port reserved for a link crossing aggregate boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StitchingReservation {
    pub vlan_tag: u16,
    pub port: String,
}

pub trait StitchingService: Send + Sync {
    /// Reserve a VLAN on a port for a link sliver
    fn record_reservation(
        &self,
        sliver: &SliverUrn,
        vlan_tag: u16,
        port: &str,
    ) -> Result<(), StitchingError>;

    /// Reinstall a reservation read back from a snapshot
    fn restore_reservation(
        &self,
        sliver: &SliverUrn,
        vlan_tag: u16,
        port: &str,
    ) -> Result<(), StitchingError>;

    fn lookup_reservation(&self, sliver: &SliverUrn) -> Option<StitchingReservation>;

    fn release_reservation(&self, sliver: &SliverUrn) -> Option<StitchingReservation>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StitchingError {
    #[error("VLAN {vlan_tag} on port {port} is already held by {holder}")]
    VlanInUse {
        vlan_tag: u16,
        port: String,
        holder: SliverUrn,
    },

    #[error("Sliver {0} already holds a stitching reservation")]
    AlreadyReserved(SliverUrn),

    #[error("VLAN tag {0} is outside 1..=4094")]
    InvalidVlan(u16),
}
