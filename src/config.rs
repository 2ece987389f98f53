//! Discovery configuration
//!
//! Loaded from TOML; every field is optional and falls back to the
//! built-in default:
//!
//! ```toml
//! max_tries = 5
//! retry_delay_ms = 50
//! vendor_filter = "Logitech"
//! sysfs_root = "/sys/class/hidraw"
//! max_concurrent_probes = 4
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::DEFAULT_VENDOR;
use crate::metadata::SYSFS_HIDRAW_ROOT;
use crate::probe::{MAX_TRIES, RETRY_DELAY};

/// Errors from loading or validating a config
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Attempts per logical index before giving up on it
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Pause between attempts on one index
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Substring a node's HID_NAME must contain, when it has one
    #[serde(default = "default_vendor_filter")]
    pub vendor_filter: String,

    /// Where hidraw node metadata lives
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Discovery passes allowed to run at once
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

fn default_max_tries() -> u32 {
    MAX_TRIES
}

fn default_retry_delay_ms() -> u64 {
    RETRY_DELAY.as_millis() as u64
}

fn default_vendor_filter() -> String {
    DEFAULT_VENDOR.to_string()
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(SYSFS_HIDRAW_ROOT)
}

fn default_max_concurrent_probes() -> usize {
    4
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
            retry_delay_ms: default_retry_delay_ms(),
            vendor_filter: default_vendor_filter(),
            sysfs_root: default_sysfs_root(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

impl DiscoveryConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hidpp")
            .join("discovery.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DiscoveryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tries",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_probes",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
