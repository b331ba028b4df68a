//! HTTP REST API for the Net Nexus connectivity portal.
//!
//! This crate provides a service that:
//! - Scans for and joins Wi-Fi networks through the host network manager
//! - Discovers, connects to and remembers Bluetooth devices
//! - Arbitrates the single Bluetooth radio between concurrent requests
//! - Optionally serves the portal's static front end
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/wifi` - Visible Wi-Fi networks
//! - `GET /api/current-connection` - Active Wi-Fi connections
//! - `POST /api/connect` - Join a Wi-Fi network (`{ssid, password?}`)
//! - `POST /api/disconnect` - Leave the current Wi-Fi network
//! - `GET /api/bluetooth-devices` - Run a general scan (`?duration=secs`)
//! - `POST /api/bluetooth-connect` - Connect by address (`{address}`)
//! - `POST /api/bluetooth-disconnect` - Disconnect the connected device
//! - `POST /api/bluetooth-save` - Remember a device (`{address, name?}`)
//! - `POST /api/bluetooth-scan/stop` - Stop the running scan
//! - `GET /api/bluetooth-previous-devices` - Remembered devices
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/netnexus/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3000"
//! static_dir = "./public"
//!
//! [storage]
//! path = "~/.local/share/netnexus/previous_devices.json"
//!
//! [bluetooth]
//! scan_duration_secs = 5
//! connect_scan_timeout_secs = 7
//! max_scan_duration_secs = 30
//! connect_timeout_secs = 15
//! ```

pub mod api;
pub mod config;
pub mod state;

pub use config::{
    BluetoothConfig, Config, ConfigError, ServerConfig, StorageConfig, ValidationError,
    default_config_path,
};
pub use state::AppState;
