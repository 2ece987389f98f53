//! Dispatcher error types

use std::io;

use thiserror::Error;

/// HID++ 1.0 error codes (register access errors)
pub mod hidpp10 {
    pub const INVALID_SUB_ID: u8 = 0x01;
    pub const INVALID_ADDRESS: u8 = 0x02;
    pub const INVALID_VALUE: u8 = 0x03;
    pub const CONNECT_FAIL: u8 = 0x04;
    pub const TOO_MANY_DEVICES: u8 = 0x05;
    pub const ALREADY_EXISTS: u8 = 0x06;
    pub const BUSY: u8 = 0x07;
    /// Nothing is paired at the requested index
    pub const UNKNOWN_DEVICE: u8 = 0x08;
    pub const RESOURCE_ERROR: u8 = 0x09;
    pub const REQUEST_UNAVAILABLE: u8 = 0x0A;
    pub const INVALID_PARAM_VALUE: u8 = 0x0B;
    pub const WRONG_PIN_CODE: u8 = 0x0C;
}

/// HID++ 2.0 error codes (feature call errors)
pub mod hidpp20 {
    pub const UNKNOWN: u8 = 0x01;
    pub const INVALID_ARGUMENT: u8 = 0x02;
    pub const OUT_OF_RANGE: u8 = 0x03;
    pub const HARDWARE_ERROR: u8 = 0x04;
    pub const INTERNAL: u8 = 0x05;
    pub const INVALID_FEATURE_INDEX: u8 = 0x06;
    pub const INVALID_FUNCTION_ID: u8 = 0x07;
    pub const BUSY: u8 = 0x08;
    pub const UNSUPPORTED: u8 = 0x09;
    /// Nothing answers at the requested index
    pub const UNKNOWN_DEVICE: u8 = 0x0A;
}

/// Errors raised while querying a device at one index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No device answers at this index
    #[error("Unknown device")]
    UnknownDevice,

    /// Error report in HID++ 1.0 format
    #[error("HID++ 1.0 error 0x{code:02X}")]
    Hidpp10 { code: u8 },

    /// Error report in HID++ 2.0 format
    #[error("HID++ 2.0 error 0x{code:02X}")]
    Hidpp20 { code: u8 },

    #[error("Request timed out")]
    Timeout,

    /// Read/write failure on the node or any other runtime fault
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// Check if the error means "nothing at this index"
    ///
    /// This is the only authoritative negative answer; every other error
    /// may clear up on a later attempt.
    pub fn is_unknown_device(&self) -> bool {
        matches!(
            self,
            Self::UnknownDevice
                | Self::Hidpp10 {
                    code: hidpp10::UNKNOWN_DEVICE
                }
                | Self::Hidpp20 {
                    code: hidpp20::UNKNOWN_DEVICE
                }
        )
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut {
            ProtocolError::Timeout
        } else {
            ProtocolError::Io(e.to_string())
        }
    }
}

/// Errors raised while opening a dispatcher on a raw node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The node has no HID++ reports in its descriptor
    #[error("Not a HID++ device")]
    NotProtocolDevice,

    /// The node could not be opened at all
    #[error("Failed to open: {0}")]
    OpenFailed(String),
}

impl From<io::Error> for OpenError {
    fn from(e: io::Error) -> Self {
        OpenError::OpenFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_classification() {
        assert!(ProtocolError::UnknownDevice.is_unknown_device());
        assert!(ProtocolError::Hidpp10 {
            code: hidpp10::UNKNOWN_DEVICE
        }
        .is_unknown_device());
        assert!(!ProtocolError::Hidpp10 {
            code: hidpp10::BUSY
        }
        .is_unknown_device());
        assert!(ProtocolError::Hidpp20 {
            code: hidpp20::UNKNOWN_DEVICE
        }
        .is_unknown_device());
        assert!(!ProtocolError::Hidpp20 {
            code: hidpp20::BUSY
        }
        .is_unknown_device());
        assert!(!ProtocolError::Timeout.is_unknown_device());
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "no answer");
        assert_eq!(ProtocolError::from(e), ProtocolError::Timeout);

        let e = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(ProtocolError::from(e), ProtocolError::Io(_)));
    }

    #[test]
    fn test_open_error_from_io() {
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        assert_eq!(
            OpenError::from(e),
            OpenError::OpenFailed("Permission denied".into())
        );
    }
}
