//! Index probing: which logical slots on a node speak HID++ 2.0
//!
//! A node is walked slot by slot in [`DeviceIndex::PROBE_ORDER`]. Each slot
//! gets a bounded number of attempts; only "unknown device" ends a slot
//! early. The six wireless slots are only worth asking about when the
//! node's default slot answered like a receiver (HID++ 1.0).

use std::fmt;
use std::time::Duration;

use hidpp_transport::{
    BoxedDispatcher, DeviceIndex, Dispatcher, DispatcherFactory, OpenError, ProtocolError,
    ProtocolVersion,
};
use tracing::{debug, error, info};

use crate::config::DiscoveryConfig;
use crate::device::{DeviceFactory, DeviceKey, SharedDevice};

/// Default attempts per index
pub const MAX_TRIES: u32 = 5;

/// Default pause between attempts on one index
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Which layer raised a retryable fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// HID++ 1.0 error report other than "unknown device"
    Hidpp10 { code: u8 },
    /// HID++ 2.0 error report
    Hidpp20 { code: u8 },
    /// Node I/O or other runtime failure
    Io,
}

/// Classified result of one probe step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The index answered; `name` is only queried for HID++ 2.0 devices
    Accepted {
        version: ProtocolVersion,
        name: Option<String>,
    },
    /// Nothing at this index
    UnknownAtIndex,
    /// Retryable protocol or I/O fault
    Transient { kind: TransientKind, message: String },
    Timeout,
    /// The node does not carry HID++ reports
    NotProtocolDevice,
    /// The node could not be opened
    OpenFailed { message: String },
}

impl ProbeOutcome {
    /// Worth another attempt at the same index
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout)
    }
}

impl From<ProtocolError> for ProbeOutcome {
    fn from(e: ProtocolError) -> Self {
        let message = e.to_string();
        match e {
            e if e.is_unknown_device() => ProbeOutcome::UnknownAtIndex,
            ProtocolError::UnknownDevice => ProbeOutcome::UnknownAtIndex,
            ProtocolError::Hidpp10 { code } => ProbeOutcome::Transient {
                kind: TransientKind::Hidpp10 { code },
                message,
            },
            ProtocolError::Hidpp20 { code } => ProbeOutcome::Transient {
                kind: TransientKind::Hidpp20 { code },
                message,
            },
            ProtocolError::Timeout => ProbeOutcome::Timeout,
            ProtocolError::Io(_) => ProbeOutcome::Transient {
                kind: TransientKind::Io,
                message,
            },
        }
    }
}

impl From<OpenError> for ProbeOutcome {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::NotProtocolDevice => ProbeOutcome::NotProtocolDevice,
            OpenError::OpenFailed(message) => ProbeOutcome::OpenFailed { message },
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted {
                version,
                name: Some(name),
            } => write!(f, "{name} (HID++ {version})"),
            Self::Accepted { version, name: None } => write!(f, "HID++ {version}"),
            Self::UnknownAtIndex => write!(f, "unknown device"),
            Self::Transient { message, .. } => write!(f, "{message}"),
            Self::Timeout => write!(f, "timed out"),
            Self::NotProtocolDevice => write!(f, "not a HID++ device"),
            Self::OpenFailed { message } => write!(f, "open failed: {message}"),
        }
    }
}

/// Final outcome at one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProbe {
    pub index: DeviceIndex,
    pub outcome: ProbeOutcome,
    /// Attempts spent, including the final one
    pub attempts: u32,
}

/// Everything one walk over a node produced
#[derive(Default)]
pub struct ProbeReport {
    /// Per-index results in probe order; skipped indices are absent
    pub probes: Vec<IndexProbe>,
    /// The default slot answered exactly 1.0
    pub receiver_seen: bool,
    /// Devices constructed for HID++ 2.0 answers
    pub devices: Vec<SharedDevice>,
}

impl ProbeReport {
    pub fn probed_indices(&self) -> Vec<DeviceIndex> {
        self.probes.iter().map(|p| p.index).collect()
    }
}

/// Walks the logical indices of a node with bounded retries
#[derive(Debug, Clone)]
pub struct IndexProber {
    max_tries: u32,
    retry_delay: Duration,
}

impl Default for IndexProber {
    fn default() -> Self {
        Self::new(MAX_TRIES, RETRY_DELAY)
    }
}

impl IndexProber {
    /// `max_tries` below 1 is raised to 1
    pub fn new(max_tries: u32, retry_delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.max_tries, config.retry_delay())
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Open a dispatcher, classifying the failure
    pub fn open(
        &self,
        dispatchers: &dyn DispatcherFactory,
        path: &str,
    ) -> Result<BoxedDispatcher, ProbeOutcome> {
        dispatchers.open(path).map_err(ProbeOutcome::from)
    }

    /// Walk all indices of `path` and build devices for HID++ 2.0 answers
    ///
    /// No device is built for a key `registered` reports as already managed.
    pub fn probe(
        &self,
        dispatcher: &dyn Dispatcher,
        path: &str,
        factory: &dyn DeviceFactory,
        registered: &dyn Fn(&DeviceKey) -> bool,
    ) -> ProbeReport {
        let mut report = ProbeReport::default();

        for index in DeviceIndex::PROBE_ORDER {
            if index == DeviceIndex::Wireless1 && !report.receiver_seen {
                break;
            }

            let probe = self.probe_index(dispatcher, path, index);

            if let ProbeOutcome::Accepted { version, name } = &probe.outcome {
                if index == DeviceIndex::DefaultDevice && version.is_receiver() {
                    debug!(path = %path, "Receiver found, probing wireless slots");
                    report.receiver_seen = true;
                }
                if version.is_feature_based() {
                    if registered(&DeviceKey::new(path, index)) {
                        debug!(path = %path, index = %index, "Already registered, skipping");
                    } else {
                        let name = name.as_deref().unwrap_or_default();
                        let device = factory.create(path, index, name);
                        info!(index = %index, path = %path, "{} detected", device.name());
                        report.devices.push(device);
                    }
                }
            }

            report.probes.push(probe);
        }

        report
    }

    /// Probe one index until it answers, is unknown, or attempts run out
    pub fn probe_index(
        &self,
        dispatcher: &dyn Dispatcher,
        path: &str,
        index: DeviceIndex,
    ) -> IndexProbe {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = Self::attempt(dispatcher, index);

            if !outcome.is_retryable() {
                return IndexProbe {
                    index,
                    outcome,
                    attempts,
                };
            }

            if attempts >= self.max_tries {
                Self::log_exhausted(path, index, &outcome);
                return IndexProbe {
                    index,
                    outcome,
                    attempts,
                };
            }

            debug!(
                path = %path,
                index = %index,
                attempt = attempts,
                "Probe failed ({}), retrying",
                outcome
            );
            std::thread::sleep(self.retry_delay);
        }
    }

    fn attempt(dispatcher: &dyn Dispatcher, index: DeviceIndex) -> ProbeOutcome {
        let version = match dispatcher.protocol_version(index) {
            Ok(version) => version,
            Err(e) => return e.into(),
        };

        if !version.is_feature_based() {
            return ProbeOutcome::Accepted {
                version,
                name: None,
            };
        }

        match dispatcher.device_name(index) {
            Ok(name) => ProbeOutcome::Accepted {
                version,
                name: Some(name),
            },
            Err(e) => e.into(),
        }
    }

    fn log_exhausted(path: &str, index: DeviceIndex, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Timeout => {
                error!(path = %path, index = %index, "Device {} (index {}) timed out", path, index);
            }
            ProbeOutcome::Transient {
                kind: TransientKind::Hidpp10 { .. },
                message,
            } => {
                error!(
                    path = %path,
                    index = %index,
                    "Error while querying {}, wireless device {}: {}",
                    path,
                    index,
                    message
                );
            }
            ProbeOutcome::Transient {
                kind: TransientKind::Hidpp20 { .. },
                message,
            } => {
                error!(
                    path = %path,
                    index = %index,
                    "Error while querying {}, device {}: {}",
                    path,
                    index,
                    message
                );
            }
            ProbeOutcome::Transient {
                kind: TransientKind::Io,
                message,
            } => {
                error!(
                    path = %path,
                    index = %index,
                    "Runtime error on device {} on {}: {}",
                    index,
                    path,
                    message
                );
            }
            ProbeOutcome::Accepted { .. }
            | ProbeOutcome::UnknownAtIndex
            | ProbeOutcome::NotProtocolDevice
            | ProbeOutcome::OpenFailed { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ManagedDevice;
    use hidpp_transport::error::{hidpp10, hidpp20};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    /// Dispatcher answering from a per-index script; the last entry repeats
    #[derive(Default)]
    struct ScriptedDispatcher {
        script: Mutex<HashMap<DeviceIndex, VecDeque<Result<(u8, u8), ProtocolError>>>>,
        calls: Mutex<Vec<DeviceIndex>>,
    }

    impl ScriptedDispatcher {
        fn answer(self, index: DeviceIndex, replies: Vec<Result<(u8, u8), ProtocolError>>) -> Self {
            self.script.lock().insert(index, replies.into());
            self
        }

        fn calls_at(&self, index: DeviceIndex) -> usize {
            self.calls.lock().iter().filter(|&&i| i == index).count()
        }
    }

    impl Dispatcher for ScriptedDispatcher {
        fn protocol_version(&self, index: DeviceIndex) -> Result<ProtocolVersion, ProtocolError> {
            self.calls.lock().push(index);
            let mut script = self.script.lock();
            let Some(replies) = script.get_mut(&index) else {
                return Err(ProtocolError::UnknownDevice);
            };
            let reply = if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            };
            reply.map(ProtocolVersion::from)
        }

        fn device_name(&self, index: DeviceIndex) -> Result<String, ProtocolError> {
            Ok(format!("Device {}", index.wire_value()))
        }
    }

    struct StubDevice {
        path: String,
        index: DeviceIndex,
        name: String,
    }

    impl ManagedDevice for StubDevice {
        fn path(&self) -> &str {
            &self.path
        }
        fn index(&self) -> DeviceIndex {
            self.index
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn start(&self) {}
        fn stop(&self) {}
    }

    struct StubFactory;

    impl DeviceFactory for StubFactory {
        fn create(&self, path: &str, index: DeviceIndex, name: &str) -> SharedDevice {
            Arc::new(StubDevice {
                path: path.into(),
                index,
                name: name.into(),
            })
        }
    }

    fn fast_prober() -> IndexProber {
        IndexProber::new(MAX_TRIES, Duration::from_millis(1))
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            ProbeOutcome::from(ProtocolError::Hidpp10 {
                code: hidpp10::UNKNOWN_DEVICE
            }),
            ProbeOutcome::UnknownAtIndex
        );
        assert!(matches!(
            ProbeOutcome::from(ProtocolError::Hidpp10 { code: hidpp10::BUSY }),
            ProbeOutcome::Transient {
                kind: TransientKind::Hidpp10 { code: hidpp10::BUSY },
                ..
            }
        ));
        assert!(matches!(
            ProbeOutcome::from(ProtocolError::Hidpp20 { code: hidpp20::BUSY }),
            ProbeOutcome::Transient {
                kind: TransientKind::Hidpp20 { .. },
                ..
            }
        ));
        assert_eq!(
            ProbeOutcome::from(ProtocolError::Hidpp20 {
                code: hidpp20::UNKNOWN_DEVICE
            }),
            ProbeOutcome::UnknownAtIndex
        );
        assert_eq!(ProbeOutcome::from(ProtocolError::Timeout), ProbeOutcome::Timeout);
        assert_eq!(
            ProbeOutcome::from(OpenError::NotProtocolDevice),
            ProbeOutcome::NotProtocolDevice
        );
    }

    #[test]
    fn test_unknown_device_takes_one_attempt() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Err(ProtocolError::UnknownDevice)]);
        let probe = fast_prober().probe_index(&dispatcher, "/dev/hidraw0", DeviceIndex::DefaultDevice);
        assert_eq!(probe.outcome, ProbeOutcome::UnknownAtIndex);
        assert_eq!(probe.attempts, 1);
        assert_eq!(dispatcher.calls_at(DeviceIndex::DefaultDevice), 1);
    }

    #[test]
    fn test_hidpp20_unknown_device_takes_one_attempt() {
        let dispatcher = ScriptedDispatcher::default().answer(
            DeviceIndex::Wireless4,
            vec![Err(ProtocolError::Hidpp20 {
                code: hidpp20::UNKNOWN_DEVICE,
            })],
        );
        let probe = fast_prober().probe_index(&dispatcher, "/dev/hidraw0", DeviceIndex::Wireless4);
        assert_eq!(probe.outcome, ProbeOutcome::UnknownAtIndex);
        assert_eq!(probe.attempts, 1);
        assert_eq!(dispatcher.calls_at(DeviceIndex::Wireless4), 1);
    }

    #[test]
    fn test_transient_exhausts_attempt_budget() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Err(ProtocolError::Timeout)]);
        let probe = fast_prober().probe_index(&dispatcher, "/dev/hidraw0", DeviceIndex::DefaultDevice);
        assert_eq!(probe.outcome, ProbeOutcome::Timeout);
        assert_eq!(probe.attempts, MAX_TRIES);
        assert_eq!(dispatcher.calls_at(DeviceIndex::DefaultDevice), MAX_TRIES as usize);
    }

    #[test]
    fn test_transient_then_success() {
        let dispatcher = ScriptedDispatcher::default().answer(
            DeviceIndex::DefaultDevice,
            vec![
                Err(ProtocolError::Hidpp10 { code: hidpp10::BUSY }),
                Err(ProtocolError::Io("short read".into())),
                Ok((4, 5)),
            ],
        );
        let probe = fast_prober().probe_index(&dispatcher, "/dev/hidraw0", DeviceIndex::DefaultDevice);
        assert_eq!(probe.attempts, 3);
        assert_eq!(
            probe.outcome,
            ProbeOutcome::Accepted {
                version: ProtocolVersion::new(4, 5),
                name: Some("Device 255".into())
            }
        );
    }

    #[test]
    fn test_no_receiver_skips_wireless_range() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Ok((4, 2))])
            .answer(DeviceIndex::Wireless1, vec![Ok((4, 2))]);
        let report = fast_prober().probe(&dispatcher, "/dev/hidraw1", &StubFactory, &|_| false);

        assert!(!report.receiver_seen);
        assert_eq!(
            report.probed_indices(),
            vec![DeviceIndex::DefaultDevice, DeviceIndex::CordedDevice]
        );
        assert_eq!(dispatcher.calls_at(DeviceIndex::Wireless1), 0);
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].index(), DeviceIndex::DefaultDevice);
    }

    #[test]
    fn test_receiver_opens_wireless_range() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Ok((1, 0))])
            .answer(DeviceIndex::Wireless2, vec![Ok((2, 0))])
            .answer(DeviceIndex::Wireless5, vec![Ok((4, 5))]);
        let report = fast_prober().probe(&dispatcher, "/dev/hidraw2", &StubFactory, &|_| false);

        assert!(report.receiver_seen);
        assert_eq!(report.probes.len(), DeviceIndex::PROBE_ORDER.len());
        let indices: Vec<_> = report.devices.iter().map(|d| d.index()).collect();
        assert_eq!(indices, vec![DeviceIndex::Wireless2, DeviceIndex::Wireless5]);
    }

    #[test]
    fn test_receiver_gate_needs_exact_version() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Ok((1, 1))]);
        let report = fast_prober().probe(&dispatcher, "/dev/hidraw3", &StubFactory, &|_| false);
        assert!(!report.receiver_seen);
        assert!(report.devices.is_empty());
        assert_eq!(report.probes.len(), 2);
    }

    #[test]
    fn test_receiver_answer_on_corded_slot_does_not_gate() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::CordedDevice, vec![Ok((1, 0))]);
        let report = fast_prober().probe(&dispatcher, "/dev/hidraw4", &StubFactory, &|_| false);
        assert!(!report.receiver_seen);
        assert_eq!(dispatcher.calls_at(DeviceIndex::Wireless1), 0);
    }

    #[test]
    fn test_registered_keys_are_not_rebuilt() {
        let dispatcher = ScriptedDispatcher::default()
            .answer(DeviceIndex::DefaultDevice, vec![Ok((1, 0))])
            .answer(DeviceIndex::Wireless1, vec![Ok((4, 5))])
            .answer(DeviceIndex::Wireless2, vec![Ok((4, 5))]);
        let known = DeviceKey::new("/dev/hidraw5", DeviceIndex::Wireless1);
        let report = fast_prober().probe(&dispatcher, "/dev/hidraw5", &StubFactory, &|key| {
            *key == known
        });

        let indices: Vec<_> = report.devices.iter().map(|d| d.index()).collect();
        assert_eq!(indices, vec![DeviceIndex::Wireless2]);
        assert_eq!(report.probes.len(), DeviceIndex::PROBE_ORDER.len());
    }

    #[test]
    fn test_zero_tries_still_attempts_once() {
        let prober = IndexProber::new(0, Duration::ZERO);
        assert_eq!(prober.max_tries(), 1);
    }
}
