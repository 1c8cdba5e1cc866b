// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for GRAM CLI

pub mod config;
pub mod snapshot;

pub use self::config::ConfigCommand;
pub use self::snapshot::SnapshotCommand;
