//! Hot-plug discovery of HID++ devices behind Linux hidraw nodes
//!
//! When a hidraw node appears, discovery decides whether it is worth
//! talking to (uevent metadata), whether it speaks HID++, and at which
//! logical indices HID++ 2.0 devices live. A receiver node answering
//! HID++ 1.0 on its default index has its six wireless slots probed too.
//! Every device found is handed to a [`ManagedDevice`] running on its own
//! worker thread until the node goes away.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use hidpp_discovery::{DeviceFinder, DeviceFactory, DiscoveryConfig};
//! # use hidpp_transport::DispatcherFactory;
//! # async fn run(dispatchers: Arc<dyn DispatcherFactory>, factory: Arc<dyn DeviceFactory>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = DiscoveryConfig::load(&DiscoveryConfig::default_path())?;
//! let finder = DeviceFinder::builder(dispatchers, factory).config(config).build()?;
//! hidpp_discovery::hotplug::scan_existing(&finder)?;
//! hidpp_discovery::hotplug::watch(finder).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod filter;
pub mod finder;
pub mod metadata;
pub mod probe;
pub mod registry;

#[cfg(all(target_os = "linux", feature = "hotplug"))]
pub mod hotplug;

pub use config::{ConfigError, DiscoveryConfig};
pub use device::{DeviceFactory, DeviceKey, ManagedDevice, SharedDevice};
pub use filter::PathFilter;
pub use finder::{DeviceFinder, FinderBuilder, FinderError};
pub use metadata::{DeviceMetadata, MetadataError, MetadataSource, SysfsMetadata};
pub use probe::{IndexProbe, IndexProber, ProbeOutcome, ProbeReport, TransientKind};
pub use registry::{DeviceRegistry, RegistryEntry, RegistryError};

pub use hidpp_transport::{DeviceIndex, ProtocolVersion};
