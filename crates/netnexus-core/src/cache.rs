//! Scan-scoped cache of discovered devices.

use indexmap::IndexMap;

use netnexus_types::{DeviceAddress, DeviceSummary, display_name};

use crate::events::DiscoveryEvent;

/// A device seen during the current scan session.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice<H> {
    /// Normalized hardware address.
    pub address: DeviceAddress,
    /// Advertised name, or "Unknown Device".
    pub name: String,
    /// Driver-level handle needed to connect.
    pub handle: H,
}

impl<H> DiscoveredDevice<H> {
    /// Build a cache entry from a driver event.
    pub fn from_event(event: DiscoveryEvent<H>) -> Self {
        Self {
            name: display_name(event.name.as_deref()),
            address: event.address,
            handle: event.handle,
        }
    }

    /// Serializable view without the handle.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

/// In-memory mapping of normalized address to discovered device.
///
/// Entries keep insertion order. The first entry for an address wins: later
/// reports of the same address during a session do not replace the first
/// handle.
#[derive(Debug)]
pub struct DiscoveryCache<H> {
    devices: IndexMap<DeviceAddress, DiscoveredDevice<H>>,
}

impl<H> DiscoveryCache<H> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            devices: IndexMap::new(),
        }
    }

    /// Drop every entry. Called at the start of each scan session.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Insert a device unless its address is already cached.
    ///
    /// Returns `true` if the device was inserted.
    pub fn upsert(&mut self, device: DiscoveredDevice<H>) -> bool {
        if self.devices.contains_key(&device.address) {
            return false;
        }
        self.devices.insert(device.address.clone(), device);
        true
    }

    /// Look up a device by address.
    pub fn lookup(&self, address: &DeviceAddress) -> Option<&DiscoveredDevice<H>> {
        self.devices.get(address)
    }

    /// Iterate over cached devices in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &DiscoveredDevice<H>> {
        self.devices.values()
    }

    /// Number of cached devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<H: Clone> DiscoveryCache<H> {
    /// Owned copy of every cached device in insertion order.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice<H>> {
        self.devices.values().cloned().collect()
    }
}

impl<H> Default for DiscoveryCache<H> {
    fn default() -> Self {
        Self::new()
    }
}
