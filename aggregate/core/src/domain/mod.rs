// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Resource graph entities, state transitions and the contracts of the
//! external collaborators the aggregate manager talks to.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Entities, invariants and collaborator interfaces

pub mod urn;
pub mod sliver;
pub mod slice;
pub mod state_machine;
pub mod registry;
pub mod credential;
pub mod backend;
pub mod stitching;
pub mod descriptor;
pub mod snapshot;
pub mod events;
pub mod result;
pub mod aggregate_config;
