//! btleplug-backed radio driver.
//!
//! [`BtleRadio`] owns the first Bluetooth adapter on the host. A background
//! task reads the adapter's central events and republishes each discovered
//! peripheral as a [`DiscoveryEvent`] while at least one scan session is
//! listening.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use netnexus_types::DeviceAddress;

use crate::driver::{DiscoveryFilter, RadioDriver};
use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::events::{DiscoveryEvent, DiscoveryHub, Subscription};

/// Address reported by platforms that hide the hardware address (macOS).
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Default timeout for establishing a BLE connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeouts applied to driver operations.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use netnexus_core::ble::ConnectionConfig;
///
/// let config = ConnectionConfig::default().connection_timeout(Duration::from_secs(20));
/// assert_eq!(config.connection_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Format a peripheral ID as a string.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier a device is addressed by.
///
/// Uses the hardware address unless the platform hides it, in which case the
/// peripheral ID stands in.
fn choose_identifier(address: &str, peripheral_id: impl FnOnce() -> String) -> String {
    if address == HIDDEN_ADDRESS {
        peripheral_id()
    } else {
        address.to_string()
    }
}

/// Radio driver for a real Bluetooth adapter.
pub struct BtleRadio {
    adapter: Adapter,
    hub: DiscoveryHub<Peripheral>,
    connected: Mutex<Option<Peripheral>>,
    pump: CancellationToken,
    config: ConnectionConfig,
}

impl std::fmt::Debug for BtleRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleRadio")
            .field("subscribers", &self.hub.subscriber_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BtleRadio {
    /// Open the first adapter on the host.
    pub async fn new() -> Result<Self> {
        let adapter = get_adapter().await?;
        Self::with_adapter(adapter, ConnectionConfig::default()).await
    }

    /// Drive a specific adapter.
    pub async fn with_adapter(adapter: Adapter, config: ConnectionConfig) -> Result<Self> {
        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        let events = adapter.events().await?;
        let hub = DiscoveryHub::new();
        let pump = CancellationToken::new();
        tokio::spawn(pump_events(
            adapter.clone(),
            events,
            hub.clone(),
            pump.clone(),
        ));

        Ok(Self {
            adapter,
            hub,
            connected: Mutex::new(None),
            pump,
            config,
        })
    }
}

impl Drop for BtleRadio {
    fn drop(&mut self) {
        self.pump.cancel();
    }
}

async fn pump_events<S>(
    adapter: Adapter,
    mut events: S,
    hub: DiscoveryHub<Peripheral>,
    token: CancellationToken,
) where
    S: Stream<Item = CentralEvent> + Unpin + Send + 'static,
{
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            warn!("Bluetooth adapter event stream ended");
            break;
        };

        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        if hub.subscriber_count() == 0 {
            continue;
        }

        match adapter.peripheral(&id).await {
            Ok(peripheral) => {
                if let Some(event) = describe(peripheral).await {
                    hub.publish(event);
                }
            }
            Err(e) => debug!("Discovered peripheral vanished: {}", e),
        }
    }
    debug!("Bluetooth event pump stopped");
}

async fn describe(peripheral: Peripheral) -> Option<DiscoveryEvent<Peripheral>> {
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            debug!("Error reading peripheral properties: {}", e);
            return None;
        }
    };

    let identifier = choose_identifier(&properties.address.to_string(), || {
        format_peripheral_id(&peripheral.id())
    });
    let address = match DeviceAddress::parse(&identifier) {
        Ok(address) => address,
        Err(e) => {
            debug!("Skipping peripheral with unusable identifier: {}", e);
            return None;
        }
    };

    Some(DiscoveryEvent {
        address,
        name: properties.local_name,
        handle: peripheral,
    })
}

/// Run a connect future, failing with a timeout reason once `limit` passes.
async fn bounded_connect<F>(limit: Duration, identifier: String, connect: F) -> Result<()>
where
    F: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    match tokio::time::timeout(limit, connect).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!("Connection to {} timed out after {:?}", identifier, limit);
            Err(Error::connect_failed(identifier, ConnectionFailureReason::Timeout))
        }
    }
}

#[async_trait]
impl RadioDriver for BtleRadio {
    type Handle = Peripheral;

    async fn start_discovery(&self, filter: &DiscoveryFilter) -> Result<()> {
        if let Some(target) = &filter.target {
            debug!("Starting discovery for {}", target);
        }
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::DiscoveryFailed(e.to_string()))
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| Error::DriverStop(e.to_string()))
    }

    fn subscribe(&self) -> Subscription<Peripheral> {
        self.hub.subscribe()
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<Option<String>> {
        if !peripheral.is_connected().await? {
            let id = format_peripheral_id(&peripheral.id());
            bounded_connect(self.config.connection_timeout, id, peripheral.connect()).await?;
        }
        let name = peripheral
            .properties()
            .await?
            .and_then(|properties| properties.local_name);

        let previous = self.connected.lock().await.replace(peripheral.clone());
        if let Some(previous) = previous
            && previous.id() != peripheral.id()
            && let Err(e) = previous.disconnect().await
        {
            warn!("Failed to disconnect previous device: {}", e);
        }
        Ok(name)
    }

    async fn disconnect(&self) -> Result<()> {
        let peripheral = self.connected.lock().await.take().ok_or(Error::NotConnected)?;
        peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_prefers_address() {
        let id = choose_identifier("AA:BB:CC:DD:EE:FF", || "unused".to_string());
        assert_eq!(id, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_identifier_falls_back_on_hidden_address() {
        let id = choose_identifier(HIDDEN_ADDRESS, || {
            "8f3a3c3e-0000-4a4b-9c9d-112233445566".to_string()
        });
        assert_eq!(id, "8f3a3c3e-0000-4a4b-9c9d-112233445566");
        assert!(DeviceAddress::parse(&id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_connect_times_out() {
        let start = tokio::time::Instant::now();
        let result = bounded_connect(
            Duration::from_secs(15),
            "AA:BB:CC:DD:EE:FF".to_string(),
            std::future::pending(),
        )
        .await;

        assert_eq!(start.elapsed(), Duration::from_secs(15));
        match result {
            Err(Error::ConnectFailed { address, reason }) => {
                assert_eq!(address, "AA:BB:CC:DD:EE:FF");
                assert_eq!(reason, ConnectionFailureReason::Timeout);
            }
            other => panic!("expected a connect timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_error_passes_through() {
        let result = bounded_connect(Duration::from_secs(15), "peripheral".to_string(), async {
            Err(btleplug::Error::DeviceNotFound)
        })
        .await;
        assert!(matches!(result, Err(Error::Bluetooth(_))));
    }

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::new();
        assert_eq!(config.connection_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[tokio::test]
    #[ignore = "requires a Bluetooth adapter"]
    async fn test_hardware_discovery() {
        let radio = BtleRadio::new().await.unwrap();
        let mut sub = radio.subscribe();
        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(10), sub.next()).await;
        radio.stop_discovery().await.unwrap();
        assert!(matches!(event, Ok(Some(_))));
    }
}
