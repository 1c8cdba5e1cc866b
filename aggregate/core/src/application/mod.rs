// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod aggregate_manager;
pub mod allocation;
pub mod authorization;
pub mod expiry;
pub mod manifest;
pub mod recovery;

// Re-export the orchestrator for convenience
pub use aggregate_manager::{
    AggregateManager, AggregateSettings, Collaborators, DescribeResponse, ManifestResponse,
    StandardAggregateManager, StatusResponse, VersionInfo,
};
