//! udev hot-plug feed for the `hidraw` subsystem
//!
//! Translates udev add/remove events into [`DeviceFinder`] calls. The udev
//! handles are not `Send`, so [`watch`] must be awaited directly (e.g. from
//! `main`) rather than spawned.

use std::io;
use std::path::Path;

use futures::StreamExt;
use tokio_udev::{AsyncMonitorSocket, Enumerator, EventType, MonitorBuilder};
use tracing::{debug, error, info};

use crate::finder::DeviceFinder;

/// udev subsystem of raw HID nodes
pub const SUBSYSTEM: &str = "hidraw";

/// Node lifecycle change relevant to discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Appeared(String),
    Removed(String),
}

impl NodeEvent {
    /// Map a udev event to a node event; other actions and nodeless devices are ignored
    pub fn from_udev(event_type: EventType, devnode: Option<&Path>) -> Option<Self> {
        let path = devnode?.to_string_lossy().into_owned();
        match event_type {
            EventType::Add => Some(Self::Appeared(path)),
            EventType::Remove => Some(Self::Removed(path)),
            _ => None,
        }
    }
}

/// Start discovery for every hidraw node already present
///
/// Returns the number of nodes handed to the finder.
pub fn scan_existing(finder: &DeviceFinder) -> io::Result<usize> {
    let mut enumerator = Enumerator::new()?;
    enumerator.match_subsystem(SUBSYSTEM)?;

    let mut count = 0;
    for device in enumerator.scan_devices()? {
        if let Some(node) = device.devnode() {
            finder.on_node_appeared(&node.to_string_lossy());
            count += 1;
        }
    }

    debug!("Scanned {} existing {} nodes", count, SUBSYSTEM);
    Ok(count)
}

/// Feed udev events to `finder` until the monitor socket closes
///
/// Removals are awaited before the next event is read, so a node that is
/// unplugged and replugged is torn down before it is rediscovered.
pub async fn watch(finder: DeviceFinder) -> io::Result<()> {
    let socket = MonitorBuilder::new()?.match_subsystem(SUBSYSTEM)?.listen()?;
    let mut events = AsyncMonitorSocket::new(socket)?;
    info!("Watching {} hot-plug events", SUBSYSTEM);

    while let Some(event) = events.next().await {
        let event = event?;
        let device = event.device();
        match NodeEvent::from_udev(event.event_type(), device.devnode()) {
            Some(NodeEvent::Appeared(path)) => {
                debug!(path = %path, "Node appeared");
                finder.on_node_appeared(&path);
            }
            Some(NodeEvent::Removed(path)) => {
                debug!(path = %path, "Node removed");
                let finder = finder.clone();
                let removal = tokio::task::spawn_blocking(move || finder.on_node_removed(&path));
                if let Err(e) = removal.await {
                    error!(error = %e, "Node removal failed");
                }
            }
            None => {}
        }
    }

    Ok(())
}
