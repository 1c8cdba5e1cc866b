// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};

use crate::domain::aggregate_config::LifecycleConfig;
use crate::domain::result::AmError;

/// Sliver lifetime rules. Every expiration handed out is capped by the
/// expiration of the credential that authorized the call.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    pub allocation_lifetime: Duration,
    pub provision_lifetime: Duration,
    pub allow_shorten: bool,
}

impl ExpirationPolicy {
    pub fn from_config(config: &LifecycleConfig) -> Result<Self, AmError> {
        let convert = |d: std::time::Duration| {
            Duration::from_std(d).map_err(|e| AmError::BadArgs(format!("lifetime out of range: {}", e)))
        };
        Ok(Self {
            allocation_lifetime: convert(config.allocation_lifetime)?,
            provision_lifetime: convert(config.provision_lifetime)?,
            allow_shorten: config.renew_policy.allow_shorten,
        })
    }

    pub fn allocation_expiry(
        &self,
        now: DateTime<Utc>,
        requested: Option<DateTime<Utc>>,
        credential_expiry: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AmError> {
        Self::bounded(now, requested, now + self.allocation_lifetime, credential_expiry)
    }

    pub fn provision_expiry(
        &self,
        now: DateTime<Utc>,
        requested: Option<DateTime<Utc>>,
        credential_expiry: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AmError> {
        Self::bounded(now, requested, now + self.provision_lifetime, credential_expiry)
    }

    /// Validate a renewal of one sliver currently expiring at `current`
    pub fn check_renewal(
        &self,
        now: DateTime<Utc>,
        requested: DateTime<Utc>,
        credential_expiry: DateTime<Utc>,
        current: DateTime<Utc>,
    ) -> Result<(), AmError> {
        if requested <= now {
            return Err(AmError::BadArgs(format!(
                "requested expiration {} is in the past",
                requested.to_rfc3339()
            )));
        }
        if requested > credential_expiry {
            return Err(AmError::BadArgs(format!(
                "requested expiration {} exceeds credential expiration {}",
                requested.to_rfc3339(),
                credential_expiry.to_rfc3339()
            )));
        }
        if !self.allow_shorten && requested < current {
            return Err(AmError::BadArgs(format!(
                "renewal may not shorten expiration {} to {}",
                current.to_rfc3339(),
                requested.to_rfc3339()
            )));
        }
        Ok(())
    }

    fn bounded(
        now: DateTime<Utc>,
        requested: Option<DateTime<Utc>>,
        default: DateTime<Utc>,
        credential_expiry: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AmError> {
        if let Some(requested) = requested {
            if requested <= now {
                return Err(AmError::BadArgs(format!(
                    "geni_end_time {} is in the past",
                    requested.to_rfc3339()
                )));
            }
        }
        Ok(requested.unwrap_or(default).min(credential_expiry))
    }
}
