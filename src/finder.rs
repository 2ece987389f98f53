//! Device finder: reacts to hidraw nodes appearing and disappearing
//!
//! Every appeared node gets one discovery pass (metadata, filter, probe,
//! register). Passes run as tokio tasks, bounded by a semaphore, with the
//! blocking work on the blocking pool so the hotplug caller never waits.
//! Each registered device runs on its own named thread, joined exactly once
//! when its node goes away or the finder shuts down.

use std::collections::HashMap;
use std::sync::Arc;

use hidpp_transport::DispatcherFactory;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, DiscoveryConfig};
use crate::device::{DeviceFactory, DeviceKey, SharedDevice};
use crate::filter::{PathFilter, HID_NAME_KEY};
use crate::metadata::{MetadataSource, SysfsMetadata};
use crate::probe::{IndexProber, ProbeOutcome};
use crate::registry::{DeviceRegistry, RegistryEntry, RegistryError};

/// Errors from building a finder
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One lock per node path, shared by discovery and removal of that path
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Run `f` while holding the lock for `path`
    fn with<T>(&self, path: &str, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.locks.lock().entry(path.to_string()).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };
        self.release(path, lock);
        result
    }

    /// Forget the lock for `path` once nobody else holds a handle to it
    fn release(&self, path: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        drop(lock);
        if locks.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(path);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Shared state behind every [`DeviceFinder`] clone and in-flight pass
struct FinderInner {
    metadata: Arc<dyn MetadataSource>,
    dispatchers: Arc<dyn DispatcherFactory>,
    factory: Arc<dyn DeviceFactory>,
    filter: PathFilter,
    prober: IndexProber,
    registry: DeviceRegistry,
    path_locks: PathLocks,
}

impl FinderInner {
    fn discover(&self, path: &str) -> Vec<DeviceKey> {
        let metadata = match self.metadata.resolve(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(path = %path, "{}", e);
                return Vec::new();
            }
        };

        if !self.filter.admit(&metadata) {
            debug!(
                path = %path,
                name = metadata.get(HID_NAME_KEY).unwrap_or_default(),
                "Skipping non-{} node",
                self.filter.vendor()
            );
            return Vec::new();
        }

        self.path_locks.with(path, || self.probe_and_register(path))
    }

    fn probe_and_register(&self, path: &str) -> Vec<DeviceKey> {
        let dispatcher = match self.prober.open(self.dispatchers.as_ref(), path) {
            Ok(dispatcher) => dispatcher,
            Err(ProbeOutcome::OpenFailed { message }) => {
                warn!(path = %path, "Failed to open {}: {}", path, message);
                return Vec::new();
            }
            Err(outcome) => {
                debug!(path = %path, "Skipping {}: {}", path, outcome);
                return Vec::new();
            }
        };

        let report = self.prober.probe(
            dispatcher.as_ref(),
            path,
            self.factory.as_ref(),
            &|key| self.registry.contains(key),
        );
        // Devices open their own channels once started
        drop(dispatcher);

        report
            .devices
            .into_iter()
            .filter_map(|device| self.register(device))
            .collect()
    }

    fn register(&self, device: SharedDevice) -> Option<DeviceKey> {
        let key = device.key();
        if self.registry.contains(&key) {
            debug!(device = %key, "Already registered, skipping");
            return None;
        }

        let worker = {
            let device = Arc::clone(&device);
            std::thread::Builder::new()
                .name(worker_name(&key))
                .spawn(move || device.start())
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                error!(device = %key, error = %e, "Failed to spawn device worker");
                return None;
            }
        };

        match self.registry.insert(device, worker) {
            Ok(()) => Some(key),
            Err(RegistryError::Duplicate { key, entry }) => {
                debug!(device = %key, "Already registered, stopping duplicate");
                Self::stop(*entry);
                None
            }
        }
    }

    fn remove_path(&self, path: &str) {
        self.path_locks.with(path, || {
            for entry in self.registry.remove_all_for_path(path) {
                info!(path = %path, "{} on {} disconnected", entry.device.name(), path);
                Self::stop(entry);
            }
        });
    }

    fn shutdown(&self) {
        for entry in self.registry.drain() {
            debug!(device = %entry.key(), "Stopping {}", entry.device.name());
            Self::stop(entry);
        }
    }

    fn stop(entry: RegistryEntry) {
        let key = entry.key();
        if entry.shutdown().is_err() {
            error!(device = %key, "Device worker panicked");
        }
    }
}

impl Drop for FinderInner {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        // Joining workers must not stall a runtime worker thread
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.shutdown());
            }
            _ => self.shutdown(),
        }
    }
}

/// Thread name for a device worker, e.g. `hidpp-hidraw3-2`
fn worker_name(key: &DeviceKey) -> String {
    let node = key.path.rsplit('/').next().unwrap_or(&key.path);
    format!("hidpp-{}-{}", node, key.index.wire_value())
}

/// Builder for [`DeviceFinder`]
pub struct FinderBuilder {
    config: DiscoveryConfig,
    dispatchers: Arc<dyn DispatcherFactory>,
    factory: Arc<dyn DeviceFactory>,
    metadata: Option<Arc<dyn MetadataSource>>,
    runtime: Option<Handle>,
}

impl FinderBuilder {
    pub fn config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the sysfs metadata source
    pub fn metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Runtime to run discovery passes on (default: the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<DeviceFinder, FinderError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(SysfsMetadata::new(&self.config.sysfs_root)));

        let inner = FinderInner {
            metadata,
            dispatchers: self.dispatchers,
            factory: self.factory,
            filter: PathFilter::new(self.config.vendor_filter.clone()),
            prober: IndexProber::from_config(&self.config),
            registry: DeviceRegistry::new(),
            path_locks: PathLocks::default(),
        };

        Ok(DeviceFinder {
            inner: Arc::new(inner),
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_probes)),
            runtime,
        })
    }
}

/// Discovers HID++ devices on hidraw nodes and manages their workers
///
/// Cloning is cheap; all clones share one registry. Dropping the last clone
/// stops and joins every remaining worker. On a multi-thread runtime that
/// happens through `block_in_place`; on a current-thread runtime call
/// [`shutdown`](Self::shutdown) from a blocking context before the drop.
#[derive(Clone)]
pub struct DeviceFinder {
    inner: Arc<FinderInner>,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl DeviceFinder {
    pub fn builder(
        dispatchers: Arc<dyn DispatcherFactory>,
        factory: Arc<dyn DeviceFactory>,
    ) -> FinderBuilder {
        FinderBuilder {
            config: DiscoveryConfig::default(),
            dispatchers,
            factory,
            metadata: None,
            runtime: None,
        }
    }

    /// Start a discovery pass for a new node and return immediately
    ///
    /// The returned handle only reports completion; dropping it leaves the
    /// pass running. Failures end in a log line, never in the handle.
    pub fn on_node_appeared(&self, path: &str) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let permits = Arc::clone(&self.permits);
        let path = path.to_string();

        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let pass = {
                let path = path.clone();
                tokio::task::spawn_blocking(move || inner.discover(&path))
            };
            if let Err(e) = pass.await {
                error!(path = %path, error = %e, "Discovery pass failed");
            }
        })
    }

    /// Run one discovery pass on the calling thread
    ///
    /// Returns the keys registered by this pass.
    pub fn discover(&self, path: &str) -> Vec<DeviceKey> {
        self.inner.discover(path)
    }

    /// Stop and join every device on `path`
    ///
    /// Waits for an in-flight discovery pass on the same path first. Returns
    /// once every worker for the path has exited.
    pub fn on_node_removed(&self, path: &str) {
        self.inner.remove_path(path);
    }

    /// Registered devices, sorted by path then index
    pub fn devices(&self) -> Vec<DeviceKey> {
        self.inner.registry.keys()
    }

    /// Stop and join every registered device
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
