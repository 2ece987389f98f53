//! Raw node metadata (`uevent` key/value pairs)
//!
//! The kernel describes every hidraw node in
//! `/sys/class/hidraw/<node>/device/uevent`, one `KEY=VALUE` per line:
//!
//! ```text
//! DRIVER=logitech-djreceiver
//! HID_ID=0003:0000046D:0000C52B
//! HID_NAME=Logitech USB Receiver
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Default sysfs directory holding one entry per hidraw node
pub const SYSFS_HIDRAW_ROOT: &str = "/sys/class/hidraw";

/// Errors from metadata resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The path has no final component to look the node up by
    #[error("Expected a device node but got directory: {0}")]
    NoBasename(String),
}

/// Key/value description of a raw node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    entries: HashMap<String, String>,
}

impl DeviceMetadata {
    /// Parse `KEY=VALUE` lines
    ///
    /// Lines without `=` are skipped. The split happens at the first `=`,
    /// so values may contain further `=`. When a key repeats, the first
    /// occurrence is kept.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            if let Some((key, value)) = line.split_once('=') {
                entries
                    .entry(key.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Self { entries }
    }

    /// Look up a key; `Some("")` means present but empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Resolves a raw node path to its metadata
pub trait MetadataSource: Send + Sync {
    fn resolve(&self, path: &str) -> Result<DeviceMetadata, MetadataError>;
}

/// Final component of a node path (`/dev/hidraw3` -> `hidraw3`)
///
/// A path without any `/`, or ending in one, has no usable basename.
pub fn node_basename(path: &str) -> Result<&str, MetadataError> {
    match path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => Ok(name),
        _ => Err(MetadataError::NoBasename(path.to_string())),
    }
}

/// Metadata read from the sysfs `uevent` file of a hidraw node
#[derive(Debug, Clone)]
pub struct SysfsMetadata {
    root: PathBuf,
}

impl Default for SysfsMetadata {
    fn default() -> Self {
        Self::new(SYSFS_HIDRAW_ROOT)
    }
}

impl SysfsMetadata {
    /// Create a source reading below `root` instead of `/sys/class/hidraw`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn uevent_path(&self, node: &str) -> PathBuf {
        self.root.join(node).join("device").join("uevent")
    }
}

impl MetadataSource for SysfsMetadata {
    fn resolve(&self, path: &str) -> Result<DeviceMetadata, MetadataError> {
        let node = node_basename(path)?;
        let uevent = self.uevent_path(node);

        // A missing or unreadable uevent leaves the filter nothing to reject on
        match std::fs::read_to_string(&uevent) {
            Ok(content) => Ok(DeviceMetadata::parse(&content)),
            Err(e) => {
                debug!(path = %uevent.display(), error = %e, "No uevent metadata");
                Ok(DeviceMetadata::default())
            }
        }
    }
}
