//! Durable storage of previously connected Bluetooth devices.
//!
//! The store is a small append-only list of [`SavedDevice`] records keyed by
//! hardware address. Appending an address that is already present is a
//! no-op, so saving the same device twice (in any letter case) leaves one
//! record.
//!
//! # Example
//!
//! ```no_run
//! use netnexus_store::{DeviceStore, JsonFileStore};
//! use netnexus_types::{DeviceAddress, SavedDevice};
//!
//! let store = JsonFileStore::open_default();
//! let address = DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
//! store.append(SavedDevice::new(address, Some("Speaker")))?;
//! for device in store.load()? {
//!     println!("{} [{}]", device.name, device.address);
//! }
//! # Ok::<(), netnexus_store::Error>(())
//! ```

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{DeviceStore, JsonFileStore, MemoryStore};

pub use netnexus_types::SavedDevice;

/// Default store path following platform conventions.
///
/// - Linux: `~/.local/share/netnexus/previous_devices.json`
/// - macOS: `~/Library/Application Support/netnexus/previous_devices.json`
/// - Windows: `C:\Users\<user>\AppData\Local\netnexus\previous_devices.json`
pub fn default_store_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("netnexus")
        .join("previous_devices.json")
}
