// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Authorization gate
//!
//! Runs after URN resolution and before any graph mutation. Verification is
//! delegated to the credential verifier; the gate re-checks that the grants it
//! returned cover every required privilege on the resolved slice and derives
//! the expiration bound used for new and renewed slivers.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::domain::credential::{
    Authorization, Credential, CredentialVerifier, GrantedCredential, Privilege,
};
use crate::domain::result::AmError;
use crate::domain::urn::SliceUrn;

#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: Arc<dyn CredentialVerifier>,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn authorize(
        &self,
        credentials: &[Credential],
        required: &[Privilege],
        target: Option<&SliceUrn>,
    ) -> Result<Authorization, AmError> {
        let target_str = target.map(|t| t.as_str());
        let granted = self
            .verifier
            .verify(credentials, required, target_str)
            .await
            .map_err(|e| AmError::Authorization(e.to_string()))?;

        let now = Utc::now();
        let applicable: Vec<_> = granted
            .into_iter()
            .filter(|g| g.expires_at > now)
            .filter(|g| target_str.map(|t| t == g.target_urn).unwrap_or(true))
            .collect();

        if applicable.is_empty() {
            return Err(AmError::Authorization(format!(
                "no valid credential for {}",
                target_str.unwrap_or("this aggregate")
            )));
        }

        // The bound comes from the grants that carry the required privileges:
        // the longest-lived holder of each privilege, then the earliest of those.
        let mut bound: Option<&GrantedCredential> = None;
        for privilege in required {
            let holder = applicable
                .iter()
                .filter(|g| g.grants(*privilege))
                .max_by_key(|g| g.expires_at)
                .ok_or_else(|| {
                    AmError::Authorization(format!(
                        "privilege '{}' not granted on {}",
                        privilege,
                        target_str.unwrap_or_default()
                    ))
                })?;
            if bound.map_or(true, |b| holder.expires_at < b.expires_at) {
                bound = Some(holder);
            }
        }
        let bound = match bound {
            Some(grant) => grant,
            None => applicable
                .iter()
                .max_by_key(|g| g.expires_at)
                .ok_or_else(|| AmError::Authorization("no valid credential".to_string()))?,
        };

        debug!(
            caller = %bound.owner_urn,
            target = ?target_str,
            privileges = ?required,
            expires_at = %bound.expires_at,
            "Authorized request"
        );
        Ok(Authorization {
            caller_urn: bound.owner_urn.clone(),
            expires_at: bound.expires_at,
        })
    }
}
