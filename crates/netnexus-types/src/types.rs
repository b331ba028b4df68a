//! Core value types shared by the radio coordinator, the store and the API.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::address::DeviceAddress;

/// Display name used when a device does not advertise one.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Resolve an optional advertised name to a display name.
///
/// Blank names count as missing.
#[must_use]
pub fn display_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => UNKNOWN_DEVICE_NAME.to_string(),
    }
}

/// A device record persisted in the device store.
///
/// At most one record exists per address. Records are never mutated once
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SavedDevice {
    /// Display name at the time the device was saved.
    pub name: String,
    /// Hardware address (serialized in uppercase form).
    pub address: DeviceAddress,
}

impl SavedDevice {
    /// Create a saved device record, defaulting a missing name.
    pub fn new(address: DeviceAddress, name: Option<&str>) -> Self {
        Self {
            name: display_name(name),
            address,
        }
    }
}

/// Serializable view of a device found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSummary {
    /// Advertised name, or [`UNKNOWN_DEVICE_NAME`].
    pub name: String,
    /// Hardware address (serialized in uppercase form).
    pub address: DeviceAddress,
}

/// A visible Wi-Fi network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WifiNetwork {
    /// Network name.
    pub ssid: String,
    /// Access point hardware address.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bssid: Option<String>,
    /// Signal quality in percent, as reported by the backend.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub strength: Option<u8>,
    /// Network mode (e.g. `Infra`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub network_type: Option<String>,
    /// Authentication scheme (e.g. `WPA2`), `None` for open networks.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub authentication: Option<String>,
    /// Encryption flags.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub encryption: Option<String>,
}

impl WifiNetwork {
    /// Create a network entry with only an SSID.
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Default::default()
        }
    }

    /// Whether joining this network needs credentials.
    #[must_use]
    pub fn is_secured(&self) -> bool {
        match self.authentication.as_deref().map(str::trim) {
            None | Some("") | Some("--") => false,
            Some(auth) => !auth.eq_ignore_ascii_case("open") && !auth.eq_ignore_ascii_case("none"),
        }
    }
}

/// An active Wi-Fi connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WifiConnection {
    /// Network name.
    pub ssid: String,
    /// Access point hardware address.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bssid: Option<String>,
    /// Signal quality in percent.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub strength: Option<u8>,
    /// Interface carrying the connection (e.g. `wlan0`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub iface: Option<String>,
}
