//! Error types for netnexus-core.
//!
//! # Outcome Classes
//!
//! | Error | Meaning | Caller action |
//! |-------|---------|---------------|
//! | [`Error::AlreadyScanning`] | Another scan holds the radio | Wait, then retry |
//! | [`Error::DeviceNotFound`] | Targeted scan window elapsed | Bring the device closer, rescan |
//! | [`Error::ConnectFailed`] | Driver rejected the connection | Inspect the reason, maybe prompt for pairing |
//! | [`Error::Persistence`] | Device store read/write failed | Report |
//! | [`Error::InvalidAddress`] | Malformed hardware address | Fix the request |
//!
//! Nothing in this crate retries automatically. Radio operations are not
//! idempotent, so a failed connect needs a new explicit request.
//!
//! [`Error::DriverStop`] is produced by drivers when stopping discovery
//! fails. The coordinator logs it and still returns the collected scan
//! results; it never reaches the caller of a scan.

use std::time::Duration;

use thiserror::Error;

use crate::wifi::WifiError;

/// Errors that can occur while coordinating the radios.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A scan is active and the request may not preempt it.
    #[error("A Bluetooth scan is already in progress")]
    AlreadyScanning,

    /// Device not found in the cache or during a targeted scan.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// The driver rejected a connection attempt.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Uppercase address of the target device.
        address: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Discovery could not be started.
    #[error("Failed to start discovery: {0}")]
    DiscoveryFailed(String),

    /// Stopping discovery failed during cleanup.
    #[error("Failed to stop discovery: {0}")]
    DriverStop(String),

    /// Device store read or write failure.
    #[error("Persistence error: {0}")]
    Persistence(#[from] netnexus_store::Error),

    /// Malformed hardware address.
    #[error(transparent)]
    InvalidAddress(#[from] netnexus_types::ParseError),

    /// Disconnect requested while nothing is connected.
    #[error("Not connected to any device")]
    NotConnected,

    /// Wi-Fi backend error.
    #[error(transparent)]
    Wifi(#[from] WifiError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// The radio is busy with another operation.
    DriverBusy,
    /// Device moved out of range or stopped advertising.
    Unreachable,
    /// The device requires pairing or credentials.
    AuthRequired,
    /// Device rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::DriverBusy => write!(f, "radio busy"),
            Self::Unreachable => write!(f, "device unreachable"),
            Self::AuthRequired => write!(f, "authentication required"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl ConnectionFailureReason {
    /// Classify a platform BLE error raised while connecting.
    pub fn from_btleplug(err: &btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound | btleplug::Error::NotConnected => Self::Unreachable,
            btleplug::Error::TimedOut(_) => Self::Timeout,
            btleplug::Error::PermissionDenied => Self::AuthRequired,
            other => Self::BleError(other.to_string()),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// The targeted scan window elapsed without a match.
    ScanTimeout {
        /// Uppercase address that was searched for.
        address: String,
        /// Length of the scan window.
        duration: Duration,
    },
    /// The targeted scan was stopped before a match.
    ScanStopped {
        /// Uppercase address that was searched for.
        address: String,
    },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanTimeout { address, duration } => {
                write!(f, "device '{}' not seen within {:?}", address, duration)
            }
            Self::ScanStopped { address } => {
                write!(f, "scan for '{}' was stopped before it was found", address)
            }
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a targeted scan that timed out.
    pub fn scan_timeout(address: impl Into<String>, duration: Duration) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
            address: address.into(),
            duration,
        })
    }

    /// Create a connection failure with structured reason.
    pub fn connect_failed(address: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason,
        }
    }

    /// Whether this error means the device could not be located.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}

/// Result type alias using netnexus-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadyScanning;
        assert_eq!(err.to_string(), "A Bluetooth scan is already in progress");

        let err = Error::scan_timeout("AA:BB:CC:DD:EE:FF", Duration::from_secs(7));
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));
        assert!(err.to_string().contains("7s"));
        assert!(err.is_not_found());

        let err = Error::connect_failed("AA:BB:CC:DD:EE:FF", ConnectionFailureReason::AuthRequired);
        assert!(err.to_string().contains("authentication required"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_device_not_found_reasons() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter"));

        let err = Error::DeviceNotFound(DeviceNotFoundReason::ScanStopped {
            address: "11:22".to_string(),
        });
        assert!(err.to_string().contains("stopped"));
    }

    #[test]
    fn test_connection_failure_reason_display() {
        assert_eq!(ConnectionFailureReason::DriverBusy.to_string(), "radio busy");
        assert_eq!(
            ConnectionFailureReason::BleError("hci".to_string()).to_string(),
            "BLE error: hci"
        );
        assert_eq!(ConnectionFailureReason::Other("x".to_string()).to_string(), "x");
    }

    #[test]
    fn test_parse_error_conversion() {
        let parse = netnexus_types::DeviceAddress::parse("").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_failure_reason_from_btleplug() {
        assert_eq!(
            ConnectionFailureReason::from_btleplug(&btleplug::Error::DeviceNotFound),
            ConnectionFailureReason::Unreachable
        );
        assert_eq!(
            ConnectionFailureReason::from_btleplug(&btleplug::Error::TimedOut(
                Duration::from_secs(1)
            )),
            ConnectionFailureReason::Timeout
        );
        assert_eq!(
            ConnectionFailureReason::from_btleplug(&btleplug::Error::PermissionDenied),
            ConnectionFailureReason::AuthRequired
        );
        assert!(matches!(
            ConnectionFailureReason::from_btleplug(&btleplug::Error::NotSupported(
                "x".to_string()
            )),
            ConnectionFailureReason::BleError(_)
        ));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
