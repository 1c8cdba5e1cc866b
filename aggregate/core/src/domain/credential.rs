// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Credential as presented by a client. `geni_value` is opaque to the
/// aggregate and only interpreted by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub geni_type: String,
    pub geni_version: String,
    pub geni_value: String,
}

/// Privilege names carried by slice credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    Allocate,
    Provision,
    DeleteSliver,
    PerformOperationalAction,
    SliverStatus,
    RenewSliver,
    Shutdown,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Provision => "provision",
            Self::DeleteSliver => "deletesliver",
            Self::PerformOperationalAction => "performoperationalaction",
            Self::SliverStatus => "sliverstatus",
            Self::RenewSliver => "renewsliver",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential that passed verification, with what it grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedCredential {
    pub owner_urn: String,
    pub target_urn: String,
    pub privileges: HashSet<Privilege>,
    pub expires_at: DateTime<Utc>,
}

impl GrantedCredential {
    pub fn grants(&self, privilege: Privilege) -> bool {
        self.privileges.contains(&privilege)
    }
}

/// Authorization outcome used by the lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub caller_urn: String,
    /// Latest expiration among the credentials that authorized the call
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Verifier Interface
// ============================================================================

/// Verifies credential signatures and trust chains.
///
/// `target` is the slice URN the privileges must be scoped to; `None` only
/// asks for a valid credential.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        credentials: &[Credential],
        required: &[Privilege],
        target: Option<&str>,
    ) -> Result<Vec<GrantedCredential>, AuthorizationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("No credentials supplied")]
    NoCredentials,

    #[error("Credential rejected: {0}")]
    Invalid(String),

    #[error("Credential for {owner} expired at {expired_at}")]
    Expired {
        owner: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Privilege '{privilege}' not granted on {target}")]
    InsufficientPrivilege { privilege: Privilege, target: String },
}
