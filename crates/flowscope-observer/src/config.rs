//! Configuration for the observer.
//!
//! Supports loading from a TOML file with environment variable overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::options::{DEFAULT_CLUSTER_NAME, DEFAULT_MAX_FLOWS, DEFAULT_MONITOR_BUFFER};

/// On-disk configuration for the observer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverConfig {
    /// Ring buffer capacity (rounded up to a power of two at construction).
    pub max_flows: u64,

    /// Inbound monitor-event channel capacity.
    pub monitor_buffer: usize,

    /// Name of the local node.
    pub node_name: String,

    /// Cluster name used when tracking namespaces.
    pub cluster_name: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            max_flows: DEFAULT_MAX_FLOWS,
            monitor_buffer: DEFAULT_MONITOR_BUFFER,
            node_name: String::new(),
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
        }
    }
}

impl ObserverConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let config = Self::from_str(&contents)
            .with_context(|| format!("failed to parse config file {path:?}"))?;
        Ok(config)
    }

    /// Parse configuration from TOML and validate it.
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (`FLOWSCOPE_MAX_FLOWS`,
    /// `FLOWSCOPE_MONITOR_BUFFER`, `FLOWSCOPE_NODE_NAME`,
    /// `FLOWSCOPE_CLUSTER_NAME`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FLOWSCOPE_MAX_FLOWS") {
            if let Ok(max_flows) = value.parse() {
                self.max_flows = max_flows;
            }
        }
        if let Ok(value) = std::env::var("FLOWSCOPE_MONITOR_BUFFER") {
            if let Ok(monitor_buffer) = value.parse() {
                self.monitor_buffer = monitor_buffer;
            }
        }
        if let Ok(node_name) = std::env::var("FLOWSCOPE_NODE_NAME") {
            self.node_name = node_name;
        }
        if let Ok(cluster_name) = std::env::var("FLOWSCOPE_CLUSTER_NAME") {
            self.cluster_name = cluster_name;
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_flows == 0 {
            bail!("max_flows must be greater than zero");
        }
        if self.monitor_buffer == 0 {
            bail!("monitor_buffer must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.max_flows, DEFAULT_MAX_FLOWS);
        assert_eq!(config.monitor_buffer, DEFAULT_MONITOR_BUFFER);
        assert_eq!(config.cluster_name, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = ObserverConfig::from_str(
            r#"
            max_flows = 8192
            monitor_buffer = 256
            node_name = "node-1"
            cluster_name = "west"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_flows, 8192);
        assert_eq!(config.monitor_buffer, 256);
        assert_eq!(config.node_name, "node-1");
        assert_eq!(config.cluster_name, "west");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ObserverConfig::from_str("max_flows = 128").unwrap();
        assert_eq!(config.max_flows, 128);
        assert_eq!(config.monitor_buffer, DEFAULT_MONITOR_BUFFER);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(ObserverConfig::from_str("max_streams = 10").is_err());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(ObserverConfig::from_str("max_flows = 0").is_err());
        assert!(ObserverConfig::from_str("monitor_buffer = 0").is_err());
    }

    #[test]
    fn test_from_file_missing_path() {
        let missing = Path::new("/nonexistent/flowscope.toml");
        assert!(ObserverConfig::from_file(missing).is_err());
    }
}
