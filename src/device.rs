//! Managed device seam
//!
//! Discovery only decides *that* a device should be managed. What the
//! device does once started (feature setup, remapping, ...) lives behind
//! [`ManagedDevice`].

use std::fmt;
use std::sync::Arc;

use hidpp_transport::DeviceIndex;

/// Identity of a managed device: raw node plus logical index
///
/// Several devices share one path when a receiver hosts paired devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub path: String,
    pub index: DeviceIndex,
}

impl DeviceKey {
    pub fn new(path: impl Into<String>, index: DeviceIndex) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.index)
    }
}

/// A confirmed HID++ 2.0 device under runtime management
pub trait ManagedDevice: Send + Sync {
    /// Raw node the device was found on
    fn path(&self) -> &str;

    /// Logical index on that node
    fn index(&self) -> DeviceIndex;

    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Run the device loop; blocks until [`ManagedDevice::stop`] is called
    fn start(&self);

    /// Request the device loop to return
    fn stop(&self);

    fn key(&self) -> DeviceKey {
        DeviceKey::new(self.path(), self.index())
    }
}

/// Builds managed devices for accepted probes
pub trait DeviceFactory: Send + Sync {
    fn create(&self, path: &str, index: DeviceIndex, name: &str) -> Arc<dyn ManagedDevice>;
}

/// Type alias for a shared managed device
pub type SharedDevice = Arc<dyn ManagedDevice>;
