//! Dispatcher boundary for HID++ device discovery
//!
//! This crate defines what discovery needs from a HID++ protocol library:
//!
//! - open a dispatcher on a raw hidraw node
//! - ask the device at a given index for its protocol version and name
//!
//! Framing, report matching and timeouts belong to the implementation.
//! Both traits are synchronous; discovery calls them from blocking workers.

pub mod error;
pub mod types;

pub use error::{OpenError, ProtocolError};
pub use types::{DeviceIndex, ProtocolVersion};

/// An open HID++ channel on one raw node
pub trait Dispatcher: Send {
    /// Query the protocol version of the device at `index`
    ///
    /// Receivers answer 1.0 on `DefaultDevice`; HID++ 2.0 devices answer
    /// with their feature-protocol version.
    fn protocol_version(&self, index: DeviceIndex) -> Result<ProtocolVersion, ProtocolError>;

    /// Query the human-readable name of the device at `index`
    fn device_name(&self, index: DeviceIndex) -> Result<String, ProtocolError>;
}

/// Opens dispatchers on raw node paths
pub trait DispatcherFactory: Send + Sync {
    /// Open a dispatcher on `path` (e.g. `/dev/hidraw3`)
    ///
    /// Fails with [`OpenError::NotProtocolDevice`] when the node does not
    /// carry HID++ reports, and [`OpenError::OpenFailed`] when it cannot be
    /// opened.
    fn open(&self, path: &str) -> Result<Box<dyn Dispatcher>, OpenError>;
}

/// Type alias for a boxed dispatcher
pub type BoxedDispatcher = Box<dyn Dispatcher>;
