// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer
//!
//! Concrete collaborators behind the domain traits.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Backend, credential, stitching, snapshot and parsing adapters

pub mod descriptor_parser;
pub mod dev_credentials;
pub mod event_bus;
pub mod simulated_backend;
pub mod snapshot_store;
pub mod stitching;
