//! Radio discovery and connection coordinator.
//!
//! This crate mediates access to a single Bluetooth radio on behalf of many
//! concurrent callers, and wraps the host Wi-Fi stack behind a small trait.
//!
//! # Features
//!
//! - **Bounded discovery**: general scans with a fixed window, one at a time
//! - **Connect by address**: cache lookup with a targeted-scan fallback
//! - **Scan arbitration**: connects interrupt general scans, never the reverse
//! - **Saved devices**: durable, duplicate-free device history
//! - **Wi-Fi**: scan, connect with the password-required policy, disconnect
//!
//! # Platform Differences
//!
//! On Linux and Windows devices are addressed by their Bluetooth MAC address.
//! macOS hides MAC addresses, so [`BtleRadio`] reports CoreBluetooth's
//! peripheral UUID instead. That UUID is stable for one device on one Mac.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use netnexus_core::{BtleRadio, ConnectionCoordinator, CoordinatorConfig};
//! use netnexus_store::JsonFileStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = Arc::new(BtleRadio::new().await?);
//!     let store = Arc::new(JsonFileStore::open_default());
//!     let coordinator = ConnectionCoordinator::new(radio, store, CoordinatorConfig::default());
//!
//!     let report = coordinator.scan(None).await?;
//!     for device in &report.devices {
//!         println!("{} [{}]", device.name, device.address);
//!     }
//!
//!     if let Some(device) = report.devices.first() {
//!         let connected = coordinator.connect(device.address.key()).await?;
//!         coordinator.save(connected.address.key(), Some(&connected.name))?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod cache;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod events;
pub mod mock;
pub mod session;
pub mod wifi;

pub use netnexus_types::{DeviceAddress, DeviceSummary, SavedDevice};

pub use ble::{BtleRadio, ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, get_adapter};
pub use cache::{DiscoveredDevice, DiscoveryCache};
pub use coordinator::{
    AttemptOutcome, BluetoothService, ConnectedDevice, ConnectionAttempt, ConnectionCoordinator,
    CoordinatorConfig, HandleSource,
};
pub use driver::{DiscoveryFilter, RadioDriver};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{DiscoveryEvent, DiscoveryHub, Subscription};
pub use mock::{MockHandle, MockRadio, MockRadioBuilder};
pub use session::{ActiveScan, ScanPurpose, ScanReport, ScanState, ScanSummary, Termination};
pub use wifi::{MockWifi, NmcliBackend, WifiBackend, WifiError, WifiResult, connect_network};
