//! Common types for the dispatcher boundary

use std::fmt;

/// Logical sub-device slot on a raw HID node
///
/// A receiver multiplexes up to six paired devices behind one hidraw node;
/// each one is addressed by its slot. Directly attached devices answer on
/// `DefaultDevice` (and corded ones sometimes on `CordedDevice`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceIndex {
    /// The node itself (receiver, or a device attached without one)
    DefaultDevice,
    /// Corded device reached through a receiver-style index
    CordedDevice,
    Wireless1,
    Wireless2,
    Wireless3,
    Wireless4,
    Wireless5,
    Wireless6,
}

impl DeviceIndex {
    /// Order in which discovery walks the indices
    ///
    /// Discovery depends on this order: the receiver check at
    /// `DefaultDevice` gates every wireless slot that follows.
    pub const PROBE_ORDER: [DeviceIndex; 8] = [
        DeviceIndex::DefaultDevice,
        DeviceIndex::CordedDevice,
        DeviceIndex::Wireless1,
        DeviceIndex::Wireless2,
        DeviceIndex::Wireless3,
        DeviceIndex::Wireless4,
        DeviceIndex::Wireless5,
        DeviceIndex::Wireless6,
    ];

    /// Device index byte as sent in HID++ reports
    pub fn wire_value(self) -> u8 {
        match self {
            Self::DefaultDevice => 0xFF,
            Self::CordedDevice => 0x00,
            Self::Wireless1 => 0x01,
            Self::Wireless2 => 0x02,
            Self::Wireless3 => 0x03,
            Self::Wireless4 => 0x04,
            Self::Wireless5 => 0x05,
            Self::Wireless6 => 0x06,
        }
    }

    /// Reverse of [`DeviceIndex::wire_value`]
    pub fn from_wire(value: u8) -> Option<Self> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|index| index.wire_value() == value)
    }

    /// Check if this slot sits behind a receiver
    pub fn is_wireless(self) -> bool {
        !matches!(self, Self::DefaultDevice | Self::CordedDevice)
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultDevice => write!(f, "default"),
            Self::CordedDevice => write!(f, "corded"),
            wireless => write!(f, "wireless {}", wireless.wire_value()),
        }
    }
}

/// HID++ protocol version reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Version a receiver answers with on its own index
    pub const RECEIVER: ProtocolVersion = ProtocolVersion::new(1, 0);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Exactly 1.0, the receiver signature
    pub fn is_receiver(self) -> bool {
        self == Self::RECEIVER
    }

    /// HID++ 2.0 or later
    pub fn is_feature_based(self) -> bool {
        self.major > 1
    }
}

impl From<(u8, u8)> for ProtocolVersion {
    fn from((major, minor): (u8, u8)) -> Self {
        Self::new(major, minor)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_order_starts_with_receiver_slot() {
        assert_eq!(DeviceIndex::PROBE_ORDER[0], DeviceIndex::DefaultDevice);
        assert_eq!(DeviceIndex::PROBE_ORDER[1], DeviceIndex::CordedDevice);
        assert!(DeviceIndex::PROBE_ORDER[2..].iter().all(|i| i.is_wireless()));
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(DeviceIndex::DefaultDevice.wire_value(), 0xFF);
        assert_eq!(DeviceIndex::CordedDevice.wire_value(), 0x00);
        assert_eq!(DeviceIndex::Wireless6.wire_value(), 0x06);
        assert_eq!(DeviceIndex::from_wire(0x03), Some(DeviceIndex::Wireless3));
        assert_eq!(DeviceIndex::from_wire(0x07), None);
    }

    #[test]
    fn test_receiver_version() {
        assert!(ProtocolVersion::new(1, 0).is_receiver());
        assert!(!ProtocolVersion::new(1, 1).is_receiver());
        assert!(!ProtocolVersion::new(1, 0).is_feature_based());
        assert!(ProtocolVersion::new(4, 5).is_feature_based());
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceIndex::Wireless2.to_string(), "wireless 2");
        assert_eq!(ProtocolVersion::from((2, 0)).to_string(), "2.0");
    }
}
