// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Development credential verifier
//
// Accepts unsigned JSON claims in `geni_value`. There is no signature or trust
// chain check, so this verifier is only suitable for local testbeds and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::domain::credential::{
    AuthorizationError, Credential, CredentialVerifier, GrantedCredential, Privilege,
};

pub const DEV_CREDENTIAL_TYPE: &str = "gram_dev";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    owner_urn: String,
    target_urn: String,
    privileges: Vec<Privilege>,
    expires: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct DevCredentialVerifier;

impl DevCredentialVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Build a credential this verifier accepts
    pub fn issue(
        owner_urn: &str,
        target_urn: &str,
        privileges: &[Privilege],
        expires: DateTime<Utc>,
    ) -> Credential {
        let claims = Claims {
            owner_urn: owner_urn.to_string(),
            target_urn: target_urn.to_string(),
            privileges: privileges.to_vec(),
            expires,
        };
        Credential {
            geni_type: DEV_CREDENTIAL_TYPE.to_string(),
            geni_version: "1".to_string(),
            geni_value: serde_json::to_string(&claims).unwrap_or_default(),
        }
    }

    fn decode(credential: &Credential) -> Result<GrantedCredential, AuthorizationError> {
        if credential.geni_type != DEV_CREDENTIAL_TYPE {
            return Err(AuthorizationError::Invalid(format!(
                "unsupported credential type '{}'",
                credential.geni_type
            )));
        }
        let claims: Claims = serde_json::from_str(&credential.geni_value)
            .map_err(|e| AuthorizationError::Invalid(e.to_string()))?;
        Ok(GrantedCredential {
            owner_urn: claims.owner_urn,
            target_urn: claims.target_urn,
            privileges: claims.privileges.into_iter().collect::<HashSet<_>>(),
            expires_at: claims.expires,
        })
    }
}

#[async_trait]
impl CredentialVerifier for DevCredentialVerifier {
    async fn verify(
        &self,
        credentials: &[Credential],
        required: &[Privilege],
        target: Option<&str>,
    ) -> Result<Vec<GrantedCredential>, AuthorizationError> {
        if credentials.is_empty() {
            return Err(AuthorizationError::NoCredentials);
        }

        let now = Utc::now();
        let mut last_error = None;
        let mut granted = Vec::new();
        for credential in credentials {
            match Self::decode(credential) {
                Ok(grant) if grant.expires_at <= now => {
                    last_error = Some(AuthorizationError::Expired {
                        owner: grant.owner_urn,
                        expired_at: grant.expires_at,
                    });
                }
                Ok(grant) if target.map(|t| t != grant.target_urn).unwrap_or(false) => {
                    debug!(target = ?target, credential_target = %grant.target_urn, "Credential targets another URN");
                }
                Ok(grant) => granted.push(grant),
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable credential");
                    last_error = Some(e);
                }
            }
        }

        if granted.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                AuthorizationError::Invalid(format!(
                    "no credential applies to {}",
                    target.unwrap_or("this aggregate")
                ))
            }));
        }

        for privilege in required {
            if !granted.iter().any(|g| g.grants(*privilege)) {
                return Err(AuthorizationError::InsufficientPrivilege {
                    privilege: *privilege,
                    target: target.unwrap_or_default().to_string(),
                });
            }
        }

        Ok(granted)
    }
}
