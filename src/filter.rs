//! Cheap pre-filter run before any HID++ I/O

use crate::metadata::DeviceMetadata;

/// uevent key carrying the device name
pub const HID_NAME_KEY: &str = "HID_NAME";

/// Vendor substring a node name must contain when it has one
pub const DEFAULT_VENDOR: &str = "Logitech";

/// Admits or rejects a node based on its metadata
///
/// Rejects only when `HID_NAME` is present and lacks the vendor substring
/// (case-sensitive). Missing metadata admits the node.
#[derive(Debug, Clone)]
pub struct PathFilter {
    vendor: String,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR)
    }
}

impl PathFilter {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn admit(&self, metadata: &DeviceMetadata) -> bool {
        match metadata.get(HID_NAME_KEY) {
            Some(name) => name.contains(self.vendor.as_str()),
            None => true,
        }
    }
}
