//! Session client configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::MAX_VMID;
use crate::error::ClientError;

/// Upper bound for every configured lifetime or interval: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cache lifetimes
    pub cache: CacheConfig,
    /// VMID allocation
    pub vmid: VmidConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            vmid: VmidConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_yaml::from_str(content).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ClientError> {
        let lifetimes = [
            ("cache.default_ttl_secs", self.cache.default_ttl_secs),
            ("cache.vmid_reservation_ttl_secs", self.cache.vmid_reservation_ttl_secs),
            ("cache.cleanup_interval_secs", self.cache.cleanup_interval_secs),
        ];

        for (name, secs) in lifetimes {
            if secs == 0 || secs > MAX_TTL_SECS {
                return Err(ClientError::InvalidConfig(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TTL_SECS
                )));
            }
        }

        if self.vmid.start == 0 || self.vmid.start > MAX_VMID {
            return Err(ClientError::InvalidConfig(format!(
                "vmid.start must be between 1 and {}",
                MAX_VMID
            )));
        }

        Ok(())
    }
}

/// Cache lifetimes. VM and storage listings use fixed TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for node, sdn and other listings
    pub default_ttl_secs: u64,
    /// How long a handed-out VMID stays reserved
    pub vmid_reservation_ttl_secs: u64,
    /// Period of the background purge of expired entries
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 60,
            vmid_reservation_ttl_secs: 300,
            cleanup_interval_secs: 600,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn vmid_reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.vmid_reservation_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// VMID allocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmidConfig {
    /// First VMID tried when allocating
    pub start: u32,
}

impl Default for VmidConfig {
    fn default() -> Self {
        Self { start: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache.vmid_reservation_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.cleanup_interval(), Duration::from_secs(600));
        assert_eq!(config.vmid.start, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml("cache:\n  default_ttl_secs: 120\n").unwrap();
        assert_eq!(config.cache.default_ttl_secs, 120);
        assert_eq!(config.cache.vmid_reservation_ttl_secs, 300);
        assert_eq!(config.vmid.start, 100);
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let err = ClientConfig::from_yaml("cache:\n  default_ttl_secs: 0\n").unwrap_err();
        assert!(err.to_string().contains("default_ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_huge_ttl() {
        let err = ClientConfig::from_yaml("cache:\n  default_ttl_secs: 18446744073709551615\n")
            .unwrap_err();
        assert!(err.to_string().contains("default_ttl_secs"));

        let mut config = ClientConfig::default();
        config.cache.vmid_reservation_ttl_secs = MAX_TTL_SECS + 1;
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        config.cache.vmid_reservation_ttl_secs = MAX_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_start() {
        let mut config = ClientConfig::default();
        config.vmid.start = 0;
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/nonexistent/pvebridge.yaml").unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
