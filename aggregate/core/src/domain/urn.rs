// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

const URN_PREFIX: &str = "urn:publicid:IDN+";

// ============================================================================
// Value Objects
// ============================================================================

/// URN naming a slice, e.g. `urn:publicid:IDN+geni:gpo:gcf+slice+s1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceUrn(String);

impl SliceUrn {
    /// Parse and validate a client supplied slice URN
    pub fn parse(urn: &str) -> Result<Self, UrnError> {
        let rest = urn
            .strip_prefix(URN_PREFIX)
            .ok_or_else(|| UrnError::Malformed(urn.to_string()))?;

        let (authority, name) = rest
            .split_once("+slice+")
            .ok_or_else(|| UrnError::NotASlice(urn.to_string()))?;

        if authority.is_empty() || name.is_empty() || name.contains('+') {
            return Err(UrnError::Malformed(urn.to_string()));
        }

        Ok(Self(urn.to_string()))
    }

    /// Wrap a URN that is already known to be a slice URN (registry keys, snapshots)
    pub fn new_unchecked(urn: impl Into<String>) -> Self {
        Self(urn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short slice name, the segment after `+slice+`
    pub fn name(&self) -> &str {
        self.0
            .rsplit_once("+slice+")
            .map(|(_, name)| name)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for SliceUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URN naming a single sliver. Unique across the whole aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliverUrn(String);

impl SliverUrn {
    pub fn new(urn: impl Into<String>) -> Self {
        Self(urn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SliverUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SliverUrn {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sliver variant segment used when minting sliver URNs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliverType {
    VirtualMachine,
    NetworkInterface,
    NetworkLink,
}

impl SliverType {
    pub fn urn_segment(&self) -> &'static str {
        match self {
            Self::VirtualMachine => "vm",
            Self::NetworkInterface => "interface",
            Self::NetworkLink => "link",
        }
    }
}

impl fmt::Display for SliverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VirtualMachine => "VirtualMachine",
            Self::NetworkInterface => "NetworkInterface",
            Self::NetworkLink => "NetworkLink",
        };
        f.write_str(name)
    }
}

/// URN authority of this aggregate, used to mint sliver URNs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrnAuthority(String);

impl UrnAuthority {
    pub fn new(authority: impl Into<String>) -> Result<Self, UrnError> {
        let authority = authority.into();
        if authority.trim().is_empty() || authority.contains('+') {
            return Err(UrnError::InvalidAuthority(authority));
        }
        Ok(Self(authority))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mint a fresh sliver URN: `urn:publicid:IDN+<authority>+sliver+<type>-<uuid>`
    pub fn mint_sliver_urn(&self, sliver_type: SliverType, uuid: Uuid) -> SliverUrn {
        SliverUrn(format!(
            "{}{}+sliver+{}-{}",
            URN_PREFIX,
            self.0,
            sliver_type.urn_segment(),
            uuid
        ))
    }

    /// URN of the aggregate itself
    pub fn aggregate_urn(&self) -> String {
        format!("{}{}+authority+am", URN_PREFIX, self.0)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrnError {
    #[error("Malformed URN: {0}")]
    Malformed(String),

    #[error("URN does not name a slice: {0}")]
    NotASlice(String),

    #[error("Invalid URN authority: '{0}'")]
    InvalidAuthority(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_urn_parse() {
        let urn = SliceUrn::parse("urn:publicid:IDN+geni:gpo:gcf+slice+s1").unwrap();
        assert_eq!(urn.name(), "s1");
        assert_eq!(urn.as_str(), "urn:publicid:IDN+geni:gpo:gcf+slice+s1");
    }

    #[test]
    fn test_slice_urn_rejects_sliver_urn() {
        let err = SliceUrn::parse("urn:publicid:IDN+gram+sliver+vm-1").unwrap_err();
        assert!(matches!(err, UrnError::NotASlice(_)));
    }

    #[test]
    fn test_slice_urn_rejects_garbage() {
        assert!(SliceUrn::parse("s1").is_err());
        assert!(SliceUrn::parse("urn:publicid:IDN++slice+s1").is_err());
        assert!(SliceUrn::parse("urn:publicid:IDN+gcf+slice+").is_err());
    }

    #[test]
    fn test_mint_sliver_urn() {
        let authority = UrnAuthority::new("geni.bbn.com:gram").unwrap();
        let uuid = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let urn = authority.mint_sliver_urn(SliverType::VirtualMachine, uuid);
        assert_eq!(
            urn.as_str(),
            "urn:publicid:IDN+geni.bbn.com:gram+sliver+vm-123e4567-e89b-12d3-a456-426614174000"
        );
    }

    #[test]
    fn test_authority_validation() {
        assert!(UrnAuthority::new("").is_err());
        assert!(UrnAuthority::new("a+b").is_err());
    }
}
