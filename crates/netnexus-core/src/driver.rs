//! Radio driver abstraction.
//!
//! The coordinator talks to the hardware only through [`RadioDriver`]. The
//! btleplug-backed [`crate::ble::BtleRadio`] drives a real adapter and
//! [`crate::mock::MockRadio`] replays scripted advertisements for tests.

use std::fmt::Debug;

use async_trait::async_trait;

use netnexus_types::DeviceAddress;

use crate::error::Result;
use crate::events::Subscription;

/// Options passed to the driver when discovery starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryFilter {
    /// The single address a targeted scan is looking for.
    ///
    /// This is a hint; drivers may report every device they see.
    pub target: Option<DeviceAddress>,
}

impl DiscoveryFilter {
    /// Filter for a general discovery scan.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter for a targeted scan.
    pub fn target(address: DeviceAddress) -> Self {
        Self {
            target: Some(address),
        }
    }
}

/// Trait abstracting the single physical radio.
///
/// The underlying hardware runs at most one discovery operation at a time.
/// Implementations do not need to enforce that; the coordinator does.
#[async_trait]
pub trait RadioDriver: Send + Sync + 'static {
    /// Opaque driver-level reference needed to connect to a discovered device.
    type Handle: Clone + Debug + Send + Sync + 'static;

    /// Start reporting nearby devices.
    async fn start_discovery(&self, filter: &DiscoveryFilter) -> Result<()>;

    /// Stop reporting nearby devices.
    async fn stop_discovery(&self) -> Result<()>;

    /// Register a discovery handler. Dropping the subscription unregisters it.
    fn subscribe(&self) -> Subscription<Self::Handle>;

    /// Connect to a discovered device.
    ///
    /// Returns the device's name as reported after connecting, if any.
    async fn connect(&self, handle: &Self::Handle) -> Result<Option<String>>;

    /// Disconnect the currently connected device.
    async fn disconnect(&self) -> Result<()>;
}
