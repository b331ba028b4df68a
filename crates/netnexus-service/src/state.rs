//! Application state shared across handlers.
//!
//! Handlers only ever see the two radios through their service traits, so
//! tests can swap in `MockRadio`/`MockWifi` without touching the router.

use std::sync::Arc;

use netnexus_core::{BluetoothService, WifiBackend};

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// Single owner of the Bluetooth radio.
    pub bluetooth: Arc<dyn BluetoothService>,
    /// Host Wi-Fi stack.
    pub wifi: Arc<dyn WifiBackend>,
    /// Configuration the server was started with.
    pub config: Config,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        bluetooth: Arc<dyn BluetoothService>,
        wifi: Arc<dyn WifiBackend>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            bluetooth,
            wifi,
            config,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("scanning", &self.bluetooth.is_scanning())
            .field("connected", &self.bluetooth.connected_device())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
