// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`gram-core`)
//!
//! JSON-over-HTTP surface that translates requests into aggregate manager
//! calls. Every endpoint answers with the `{code, value, output}` result
//! shape; failures are reported in `code`, not by HTTP status.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | One POST endpoint per lifecycle operation, `GET /version` |

pub mod api;
