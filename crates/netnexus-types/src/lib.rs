//! Platform-agnostic types for the Net Nexus connectivity portal.
//!
//! This crate provides the value types shared by the radio coordinator
//! (netnexus-core), the device store (netnexus-store) and the HTTP API
//! (netnexus-service).
//!
//! # Features
//!
//! - [`DeviceAddress`]: hardware addresses normalized by construction
//! - [`SavedDevice`] and [`DeviceSummary`]: Bluetooth device records
//! - [`WifiNetwork`] and [`WifiConnection`]: Wi-Fi scan and status results
//!
//! # Example
//!
//! ```
//! use netnexus_types::{DeviceAddress, SavedDevice};
//!
//! let address = DeviceAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
//! let saved = SavedDevice::new(address, Some("Headphones"));
//! assert_eq!(saved.address.display(), "AA:BB:CC:DD:EE:FF");
//! ```

pub mod address;
pub mod error;
pub mod types;

pub use address::DeviceAddress;
pub use error::{ParseError, ParseResult};
pub use types::{
    DeviceSummary, SavedDevice, UNKNOWN_DEVICE_NAME, WifiConnection, WifiNetwork, display_name,
};
