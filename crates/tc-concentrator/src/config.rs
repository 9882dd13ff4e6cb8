//! Concentrator configuration.

use ipnetwork::Ipv4Network;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Default API timeout: bounds every ready-gate wait. Parallel callers
/// drive up netlink latencies, so this is generous.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 6;

fn default_api_timeout_secs() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

fn default_dhcp_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/tenant-concentrator/dhcp")
}

/// Errors loading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed.
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// The management/compute CIDR split. An empty list means auto-detect,
/// which requires a single qualifying physical link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    /// CIDRs of the management network.
    #[serde(default)]
    pub management_nets: Vec<Ipv4Network>,
    /// CIDRs of the compute network.
    #[serde(default)]
    pub compute_nets: Vec<Ipv4Network>,
}

/// Full concentrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConcentratorConfig {
    /// UUID of the tenant this concentrator serves.
    pub tenant_id: Uuid,
    /// UUID of this concentrator, assigned by the controller.
    pub concentrator_id: Uuid,
    /// Network split. Absent means the concentrator cannot initialize.
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    /// Public addresses assigned to this concentrator.
    #[serde(default)]
    pub public_ips: Vec<Ipv4Addr>,
    /// Ready-gate wait bound, in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    /// Where per-bridge dnsmasq state lives.
    #[serde(default = "default_dhcp_state_dir")]
    pub dhcp_state_dir: PathBuf,
}

impl ConcentratorConfig {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The ready-gate wait bound.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg: ConcentratorConfig = toml::from_str(
            r#"
            tenant_id = "f47ac10b-58cc-4372-a567-0e02b2c3d479"
            concentrator_id = "936da01f-9abd-4d9d-80c7-02af85c822a8"
            public_ips = ["198.51.100.10"]

            [network]
            management_nets = ["10.1.0.0/16"]
            compute_nets = ["10.2.0.0/16"]
            "#,
        )
        .unwrap();

        let network = cfg.network.as_ref().unwrap();
        assert_eq!(network.management_nets.len(), 1);
        assert_eq!(network.compute_nets.len(), 1);
        assert_eq!(cfg.api_timeout(), Duration::from_secs(6));
        assert_eq!(cfg.public_ips.len(), 1);
    }

    #[test]
    fn test_network_section_optional() {
        let cfg: ConcentratorConfig = toml::from_str(
            r#"
            tenant_id = "f47ac10b-58cc-4372-a567-0e02b2c3d479"
            concentrator_id = "936da01f-9abd-4d9d-80c7-02af85c822a8"
            "#,
        )
        .unwrap();
        assert!(cfg.network.is_none());
    }

    #[test]
    fn test_api_timeout_override() {
        let cfg: ConcentratorConfig = toml::from_str(
            r#"
            tenant_id = "f47ac10b-58cc-4372-a567-0e02b2c3d479"
            concentrator_id = "936da01f-9abd-4d9d-80c7-02af85c822a8"
            api_timeout_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api_timeout(), Duration::from_secs(2));
    }
}
