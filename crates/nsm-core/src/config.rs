//! Configuration types for the mesh chain elements
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::traits::DnsConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NsmConfig {
    /// Registration refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Static DNS sources
    #[serde(default)]
    pub dns: DnsSettings,
}

impl NsmConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.refresh.validate()?;
        self.dns.validate()?;
        Ok(())
    }
}

/// Registration refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Delay before retrying a failed renewal (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl RefreshConfig {
    /// Retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Validate the refresh configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.retry_delay_secs == 0 {
            return Err(crate::Error::config("Refresh retry delay must be > 0"));
        }
        Ok(())
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_retry_delay_secs() -> u64 {
    5
}

/// DNS source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsSettings {
    /// Sources fed into the DNS config manager, in order
    #[serde(default)]
    pub sources: Vec<DnsSource>,
}

impl DnsSettings {
    /// Validate the DNS sources
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.key.is_empty() {
                return Err(crate::Error::config("DNS source key cannot be empty"));
            }
            if !seen.insert(source.key.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate DNS source key: {}",
                    source.key
                )));
            }
            if source.config.dns_server_ips.is_empty() {
                return Err(crate::Error::config(format!(
                    "DNS source {} has no server IPs",
                    source.key
                )));
            }
        }
        Ok(())
    }
}

/// One statically configured DNS contributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsSource {
    /// Contributor key
    pub key: String,

    /// Domains and servers
    #[serde(flatten)]
    pub config: DnsConfig,
}

impl DnsSource {
    /// Create a new DNS source
    pub fn new(key: impl Into<String>, config: DnsConfig) -> Self {
        Self {
            key: key.into(),
            config,
        }
    }
}
