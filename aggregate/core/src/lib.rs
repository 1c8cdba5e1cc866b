// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! GRAM Aggregate Manager core
//!
//! Resource lifecycle orchestration for a testbed aggregate: the slice/sliver
//! resource graph, the sliver state machine, URN resolution, authorization,
//! and snapshot persistence.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, lifecycle use cases and their collaborators

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
