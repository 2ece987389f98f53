//! Registry of managed devices and their worker threads
//!
//! Each entry owns the joinable handle of its device's worker from insertion
//! until removal. Removal hands the entry back to the caller, who stops and
//! joins it outside the registry lock.

use std::collections::HashMap;
use std::fmt;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;

use crate::device::{DeviceKey, SharedDevice};

/// A managed device and the thread running it
pub struct RegistryEntry {
    pub device: SharedDevice,
    pub worker: JoinHandle<()>,
}

impl RegistryEntry {
    pub fn new(device: SharedDevice, worker: JoinHandle<()>) -> Self {
        Self { device, worker }
    }

    pub fn key(&self) -> DeviceKey {
        self.device.key()
    }

    /// Request a cooperative stop and wait for the worker to exit
    ///
    /// Returns the worker's panic payload if it panicked.
    pub fn shutdown(self) -> std::thread::Result<()> {
        self.device.stop();
        self.worker.join()
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("key", &self.key())
            .field("name", &self.device.name())
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The key is already registered; the rejected entry is handed back
    #[error("Device already registered: {key}")]
    Duplicate {
        key: DeviceKey,
        entry: Box<RegistryEntry>,
    },
}

/// Lock-protected map of managed devices
#[derive(Default)]
pub struct DeviceRegistry {
    entries: Mutex<HashMap<DeviceKey, RegistryEntry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with its running worker
    pub fn insert(&self, device: SharedDevice, worker: JoinHandle<()>) -> Result<(), RegistryError> {
        let entry = RegistryEntry::new(device, worker);
        let key = entry.key();
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                key,
                entry: Box::new(entry),
            });
        }
        entries.insert(key, entry);
        Ok(())
    }

    /// Take every entry whose path equals `path`, sorted by index
    pub fn remove_all_for_path(&self, path: &str) -> Vec<RegistryEntry> {
        let mut entries = self.entries.lock();
        let keys: Vec<DeviceKey> = entries
            .keys()
            .filter(|key| key.path == path)
            .cloned()
            .collect();
        let mut removed: Vec<RegistryEntry> =
            keys.iter().filter_map(|key| entries.remove(key)).collect();
        removed.sort_by_key(|entry| entry.device.index());
        removed
    }

    /// Take every entry
    pub fn drain(&self) -> Vec<RegistryEntry> {
        let mut removed: Vec<RegistryEntry> =
            self.entries.lock().drain().map(|(_, entry)| entry).collect();
        removed.sort_by_key(RegistryEntry::key);
        removed
    }

    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
