// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Aggregate Configuration Types
//
// Configuration schema for a GRAM aggregate manager:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Aggregate identity and URN authority
// - Sliver lifetimes and renewal policy
// - Snapshot persistence and startup recovery
// - Simulated backend inventory
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::backend::Flavor;

pub const API_VERSION: &str = "gram.geni.net/v1";
pub const KIND: &str = "AggregateConfig";

/// Top-level aggregate configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfigManifest {
    /// API version (must be "gram.geni.net/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "AggregateConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: AggregateConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateConfigSpec {
    #[serde(default)]
    pub aggregate: AggregateIdentity,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub snapshots: SnapshotConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateIdentity {
    /// Authority segment used when minting sliver URNs
    #[serde(default = "default_urn_authority")]
    pub urn_authority: String,

    /// Aggregate URN reported by GetVersion; derived from the authority if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_urn: Option<String>,
}

impl Default for AggregateIdentity {
    fn default() -> Self {
        Self {
            urn_authority: default_urn_authority(),
            aggregate_urn: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Lifetime of freshly allocated slivers
    #[serde(with = "humantime_serde", default = "default_allocation_lifetime")]
    pub allocation_lifetime: Duration,

    /// Lifetime of slivers after provisioning
    #[serde(with = "humantime_serde", default = "default_provision_lifetime")]
    pub provision_lifetime: Duration,

    #[serde(default)]
    pub renew_policy: RenewPolicy,

    #[serde(default = "default_max_vms_per_slice")]
    pub max_vms_per_slice: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allocation_lifetime: default_allocation_lifetime(),
            provision_lifetime: default_provision_lifetime(),
            renew_policy: RenewPolicy::default(),
            max_vms_per_slice: default_max_vms_per_slice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewPolicy {
    /// Whether Renew may move an expiration earlier than it currently is
    #[serde(default = "default_true")]
    pub allow_shorten: bool,
}

impl Default for RenewPolicy {
    fn default() -> Self {
        Self {
            allow_shorten: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot directory; persistence is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Number of snapshot files kept after each persist
    #[serde(default = "default_snapshot_retention")]
    pub retention: usize,

    /// Snapshot file (name or path) to restore on startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recover_from: Option<String>,

    /// Restore the most recent snapshot when no explicit one is given
    #[serde(default = "default_true")]
    pub recover_most_recent: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: None,
            retention: default_snapshot_retention(),
            recover_from: None,
            recover_most_recent: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_flavors")]
    pub flavors: Vec<Flavor>,

    /// Compute hosts VMs are placed on, round robin
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// First three octets of the management network
    #[serde(default = "default_mgmt_prefix")]
    pub mgmt_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            flavors: default_flavors(),
            hosts: default_hosts(),
            mgmt_prefix: default_mgmt_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: compact or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_urn_authority() -> String {
    "geni.net:gram".to_string()
}

fn default_allocation_lifetime() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_provision_lifetime() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_max_vms_per_slice() -> u32 {
    50
}

fn default_snapshot_retention() -> usize {
    10
}

fn default_flavors() -> Vec<Flavor> {
    vec![
        Flavor {
            name: "m1.tiny".to_string(),
            vcpus: 1,
            memory_mb: 512,
            disk_gb: 1,
        },
        Flavor {
            name: "m1.small".to_string(),
            vcpus: 1,
            memory_mb: 2048,
            disk_gb: 20,
        },
        Flavor {
            name: "m1.medium".to_string(),
            vcpus: 2,
            memory_mb: 4096,
            disk_gb: 40,
        },
    ]
}

fn default_hosts() -> Vec<String> {
    vec!["compute-1".to_string(), "compute-2".to_string()]
}

fn default_mgmt_prefix() -> String {
    "192.168.10".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for AggregateConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "gram-aggregate".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: AggregateConfigSpec::default(),
        }
    }
}

impl AggregateConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Aggregate URN reported to clients
    pub fn aggregate_urn(&self) -> String {
        self.spec
            .aggregate
            .aggregate_urn
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "urn:publicid:IDN+{}+authority+am",
                    self.spec.aggregate.urn_authority
                )
            })
    }

    /// Discover configuration file using precedence order
    /// 1. GRAM_CONFIG_PATH environment variable
    /// 2. ./gram-config.yaml (working directory)
    /// 3. ~/.gram/config.yaml (user home)
    /// 4. /etc/gram/config.yaml (system, Unix) or C:\ProgramData\Gram\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GRAM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./gram-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".gram").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/gram/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Gram\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GRAM_SNAPSHOT_DIR") {
            if val.is_empty() {
                tracing::info!("Environment override: GRAM_SNAPSHOT_DIR unset, persistence disabled");
                self.spec.snapshots.directory = None;
            } else {
                tracing::info!("Environment override: GRAM_SNAPSHOT_DIR={}", val);
                self.spec.snapshots.directory = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GRAM_SNAPSHOT_LIMIT") {
            match val.parse::<usize>() {
                Ok(limit) => {
                    tracing::info!("Environment override: GRAM_SNAPSHOT_LIMIT={}", limit);
                    self.spec.snapshots.retention = limit;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for GRAM_SNAPSHOT_LIMIT: '{}'. Expected a number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let authority = &self.spec.aggregate.urn_authority;
        if authority.trim().is_empty() || authority.contains('+') {
            anyhow::bail!("spec.aggregate.urn_authority is invalid: '{}'", authority);
        }

        if let Some(urn) = &self.spec.aggregate.aggregate_urn {
            if !urn.starts_with("urn:publicid:IDN+") {
                anyhow::bail!("spec.aggregate.aggregate_urn is not a URN: '{}'", urn);
            }
        }

        if self.spec.lifecycle.allocation_lifetime.is_zero() {
            anyhow::bail!("spec.lifecycle.allocation_lifetime must be positive");
        }

        if self.spec.lifecycle.provision_lifetime.is_zero() {
            anyhow::bail!("spec.lifecycle.provision_lifetime must be positive");
        }

        if self.spec.lifecycle.max_vms_per_slice == 0 || self.spec.lifecycle.max_vms_per_slice > 154
        {
            anyhow::bail!("spec.lifecycle.max_vms_per_slice must be within 1..=154");
        }

        if self.spec.snapshots.retention == 0 {
            anyhow::bail!("spec.snapshots.retention must be at least 1");
        }

        if self.spec.backend.hosts.is_empty() {
            anyhow::bail!("spec.backend.hosts must list at least one compute host");
        }

        if self.spec.backend.flavors.is_empty() {
            anyhow::bail!("spec.backend.flavors must list at least one flavor");
        }

        let octets: Vec<&str> = self.spec.backend.mgmt_prefix.split('.').collect();
        if octets.len() != 3 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
            anyhow::bail!(
                "spec.backend.mgmt_prefix must be three octets, got '{}'",
                self.spec.backend.mgmt_prefix
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = AggregateConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(manifest.spec.snapshots.directory.is_none());
        assert_eq!(manifest.spec.snapshots.retention, 10);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
apiVersion: gram.geni.net/v1
kind: AggregateConfig
metadata:
  name: gram-bbn
spec:
  aggregate:
    urn_authority: "geni.bbn.com:gram"
  lifecycle:
    allocation_lifetime: 5m
    provision_lifetime: 2days
    renew_policy:
      allow_shorten: false
  snapshots:
    directory: /var/lib/gram/snapshots
    retention: 3
  network:
    port: 8443
"#;
        let manifest = AggregateConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "gram-bbn");
        assert_eq!(
            manifest.spec.lifecycle.allocation_lifetime,
            Duration::from_secs(300)
        );
        assert_eq!(
            manifest.spec.lifecycle.provision_lifetime,
            Duration::from_secs(2 * 86400)
        );
        assert!(!manifest.spec.lifecycle.renew_policy.allow_shorten);
        assert_eq!(manifest.spec.snapshots.retention, 3);
        assert!(manifest.spec.snapshots.recover_most_recent);
        assert_eq!(manifest.spec.network.port, 8443);
        assert_eq!(manifest.spec.network.bind_address, "0.0.0.0");
        assert_eq!(
            manifest.aggregate_urn(),
            "urn:publicid:IDN+geni.bbn.com:gram+authority+am"
        );
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = AggregateConfigManifest::default();
        manifest.api_version = "v2".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = AggregateConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = AggregateConfigManifest::default();
        manifest.spec.snapshots.retention = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = AggregateConfigManifest::default();
        manifest.spec.aggregate.urn_authority = String::new();
        assert!(manifest.validate().is_err());

        let mut manifest = AggregateConfigManifest::default();
        manifest.spec.backend.mgmt_prefix = "10.0".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = AggregateConfigManifest::default();
        manifest.spec.lifecycle.max_vms_per_slice = 154;
        assert!(manifest.validate().is_ok());
        manifest.spec.lifecycle.max_vms_per_slice = 155;
        assert!(manifest.validate().is_err());
    }
}
