//! Connection coordinator.
//!
//! [`ConnectionCoordinator`] is the single owner of the Bluetooth radio. It
//! runs general discovery scans, resolves connect requests against the
//! discovery cache (falling back to a short targeted scan), and persists
//! devices the user chose to remember.
//!
//! # Scan arbitration
//!
//! At most one scan holds the radio. A second general scan is rejected with
//! [`Error::AlreadyScanning`]. A connect request interrupts a running general
//! scan; that scan returns what it had collected with
//! [`Termination::Preempted`]. A targeted scan started by a connect is never
//! interrupted.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use netnexus_store::DeviceStore;
use netnexus_types::{DeviceAddress, DeviceSummary, SavedDevice};

use crate::cache::DiscoveredDevice;
use crate::driver::RadioDriver;
use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::session::{ActiveScan, Radio, ScanPurpose, ScanReport, ScanSession, ScanSummary, Termination};

/// Default general scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);
/// Default targeted scan window used by connect on a cache miss.
pub const DEFAULT_CONNECT_SCAN_TIMEOUT: Duration = Duration::from_secs(7);
/// Default upper bound for caller-supplied scan durations.
pub const DEFAULT_MAX_SCAN_DURATION: Duration = Duration::from_secs(30);

/// Timing configuration for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// General scan window when the caller gives none.
    pub scan_duration: Duration,
    /// Targeted scan window for connect requests.
    pub connect_scan_timeout: Duration,
    /// Upper bound for caller-supplied scan windows.
    pub max_scan_duration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            connect_scan_timeout: DEFAULT_CONNECT_SCAN_TIMEOUT,
            max_scan_duration: DEFAULT_MAX_SCAN_DURATION,
        }
    }
}

impl CoordinatorConfig {
    /// Check that every window is positive and the default fits the bound.
    pub fn validate(&self) -> Result<()> {
        if self.scan_duration.is_zero() {
            return Err(Error::InvalidConfig("scan duration must be positive".to_string()));
        }
        if self.connect_scan_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "connect scan timeout must be positive".to_string(),
            ));
        }
        if self.scan_duration > self.max_scan_duration {
            return Err(Error::InvalidConfig(format!(
                "scan duration {:?} exceeds maximum {:?}",
                self.scan_duration, self.max_scan_duration
            )));
        }
        Ok(())
    }

    /// Resolve a caller's duration hint to the scan window actually used.
    ///
    /// A missing or zero hint means the default; longer hints are capped.
    pub fn scan_window(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) if !hint.is_zero() => hint.min(self.max_scan_duration),
            _ => self.scan_duration,
        }
    }
}

/// Where a connect request got its driver handle from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleSource {
    /// Found in the discovery cache of an earlier scan.
    Cache,
    /// Found by a targeted scan started for this request.
    TargetedScan,
}

/// A device the coordinator is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedDevice {
    /// Normalized hardware address.
    pub address: DeviceAddress,
    /// Resolved display name.
    pub name: String,
    /// How the handle was obtained.
    pub source: HandleSource,
}

/// Outcome of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Still running.
    Pending,
    /// Connected.
    Connected,
    /// No handle could be obtained.
    NotFound,
    /// The driver refused, or the request was invalid for the current state.
    Failed,
}

/// Record of the latest connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionAttempt {
    /// The requested address.
    pub target: DeviceAddress,
    /// Where the handle came from, once resolved.
    pub source: Option<HandleSource>,
    /// Outcome so far.
    pub outcome: AttemptOutcome,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single owner of the radio and the discovery cache.
pub struct ConnectionCoordinator<D: RadioDriver> {
    radio: Arc<Radio<D>>,
    store: Arc<dyn DeviceStore>,
    config: CoordinatorConfig,
    connected: Mutex<Option<ConnectedDevice>>,
    last_attempt: Mutex<Option<ConnectionAttempt>>,
}

impl<D: RadioDriver> std::fmt::Debug for ConnectionCoordinator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("config", &self.config)
            .field("scanning", &self.is_scanning())
            .field("connected", &self.connected_device())
            .finish()
    }
}

impl<D: RadioDriver> ConnectionCoordinator<D> {
    /// Create a coordinator owning `driver`.
    pub fn new(driver: Arc<D>, store: Arc<dyn DeviceStore>, config: CoordinatorConfig) -> Self {
        Self {
            radio: Radio::new(driver),
            store,
            config,
            connected: Mutex::new(None),
            last_attempt: Mutex::new(None),
        }
    }

    /// The radio driver.
    pub fn driver(&self) -> &Arc<D> {
        &self.radio.driver
    }

    /// Timing configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Whether a scan currently holds the radio.
    pub fn is_scanning(&self) -> bool {
        self.radio.slot.is_active()
    }

    /// The scan currently holding the radio.
    pub fn active_scan(&self) -> Option<ActiveScan> {
        self.radio.slot.active()
    }

    /// The connected device, if any.
    pub fn connected_device(&self) -> Option<ConnectedDevice> {
        lock(&self.connected).clone()
    }

    /// The latest connect request and its outcome.
    pub fn last_attempt(&self) -> Option<ConnectionAttempt> {
        lock(&self.last_attempt).clone()
    }

    /// Devices in the discovery cache, in discovery order.
    pub fn cached_devices(&self) -> Vec<DeviceSummary> {
        self.radio.cache().values().map(DiscoveredDevice::summary).collect()
    }

    /// Run a general discovery scan.
    ///
    /// Fails with [`Error::AlreadyScanning`] without touching the radio if a
    /// scan is active.
    pub async fn scan(&self, duration: Option<Duration>) -> Result<ScanReport<D::Handle>> {
        let window = self.config.scan_window(duration);
        let lease = self.radio.slot.try_acquire(ScanPurpose::Discovery)?;
        ScanSession::new(Arc::clone(&self.radio), lease, window, None)
            .run()
            .await
    }

    /// Ask the active scan to stop early. Returns `false` if none is active.
    pub fn stop_scan(&self) -> bool {
        let stopped = self.radio.slot.request_stop();
        if stopped {
            info!("Stop requested for the active scan");
        } else {
            debug!("Stop requested with no active scan");
        }
        stopped
    }

    /// Connect to the device at `address`.
    ///
    /// A cache hit connects immediately. A miss runs a targeted scan bounded
    /// by the connect scan timeout and connects as soon as the address is
    /// seen. Connecting does not save the device.
    pub async fn connect(&self, address: &str) -> Result<ConnectedDevice> {
        let address = DeviceAddress::parse(address)?;
        let mut attempt = ConnectionAttempt {
            target: address.clone(),
            source: None,
            outcome: AttemptOutcome::Pending,
        };
        *lock(&self.last_attempt) = Some(attempt.clone());

        let result = self.connect_inner(&address, &mut attempt).await;
        attempt.outcome = match &result {
            Ok(_) => AttemptOutcome::Connected,
            Err(e) if e.is_not_found() => AttemptOutcome::NotFound,
            Err(_) => AttemptOutcome::Failed,
        };
        *lock(&self.last_attempt) = Some(attempt);
        result
    }

    async fn connect_inner(
        &self,
        address: &DeviceAddress,
        attempt: &mut ConnectionAttempt,
    ) -> Result<ConnectedDevice> {
        self.radio.slot.preempt_discovery().await?;

        let cached = self.radio.cache().lookup(address).cloned();
        let (device, source) = match cached {
            Some(device) => {
                debug!("{} found in discovery cache", address);
                (device, HandleSource::Cache)
            }
            None => {
                info!("{} not in discovery cache, scanning for it", address);
                (self.find(address).await?, HandleSource::TargetedScan)
            }
        };
        attempt.source = Some(source);

        // Wait out any stop sequence in progress, then release the gate so a
        // slow connect never holds up a scan's stop.
        drop(self.radio.gate.read().await);
        let reported = self
            .radio
            .driver
            .connect(&device.handle)
            .await
            .map_err(|e| connect_error(address, e))?;

        let name = reported
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(device.name);
        let connected = ConnectedDevice {
            address: address.clone(),
            name,
            source,
        };
        info!("Successfully connected to {}", connected.name);
        *lock(&self.connected) = Some(connected.clone());
        Ok(connected)
    }

    async fn find(&self, address: &DeviceAddress) -> Result<DiscoveredDevice<D::Handle>> {
        let timeout = self.config.connect_scan_timeout;
        let lease = self
            .radio
            .slot
            .acquire_preempting(ScanPurpose::Targeted(address.clone()))
            .await?;
        let report = ScanSession::new(Arc::clone(&self.radio), lease, timeout, Some(address.clone()))
            .run()
            .await?;

        match (report.termination, report.matched) {
            (Termination::TargetFound, Some(device)) => Ok(device),
            (Termination::Stopped | Termination::Preempted, _) => {
                Err(Error::DeviceNotFound(DeviceNotFoundReason::ScanStopped {
                    address: address.display(),
                }))
            }
            _ => {
                warn!("{} not found within {:?}", address, timeout);
                Err(Error::scan_timeout(address.display(), timeout))
            }
        }
    }

    /// Disconnect the connected device.
    pub async fn disconnect(&self) -> Result<ConnectedDevice> {
        let current = self.connected_device().ok_or(Error::NotConnected)?;
        drop(self.radio.gate.read().await);
        self.radio.driver.disconnect().await?;
        *lock(&self.connected) = None;
        info!("Disconnected from {}", current.name);
        Ok(current)
    }

    /// Remember a device. Saving an address twice keeps the first record.
    ///
    /// Without an explicit name, the connected or cached name is used.
    pub fn save(&self, address: &str, name: Option<&str>) -> Result<SavedDevice> {
        let address = DeviceAddress::parse(address)?;
        let name = name
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.connected_device()
                    .filter(|device| device.address == address)
                    .map(|device| device.name)
            })
            .or_else(|| {
                self.radio
                    .cache()
                    .lookup(&address)
                    .map(|device| device.name.clone())
            });

        let device = SavedDevice::new(address, name.as_deref());
        if self.store.append(device.clone())? {
            return Ok(device);
        }

        debug!("{} was already saved", device.address);
        let stored = self
            .store
            .load()?
            .into_iter()
            .find(|saved| saved.address == device.address);
        Ok(stored.unwrap_or(device))
    }

    /// Every saved device in the order it was saved.
    pub fn list_previous(&self) -> Result<Vec<SavedDevice>> {
        Ok(self.store.load()?)
    }
}

fn connect_error(address: &DeviceAddress, err: Error) -> Error {
    match err {
        Error::ConnectFailed { reason, .. } => Error::connect_failed(address.display(), reason),
        Error::Bluetooth(e) => {
            Error::connect_failed(address.display(), ConnectionFailureReason::from_btleplug(&e))
        }
        other => Error::connect_failed(
            address.display(),
            ConnectionFailureReason::Other(other.to_string()),
        ),
    }
}

/// Object-safe Bluetooth surface used by the HTTP layer.
#[async_trait]
pub trait BluetoothService: Send + Sync {
    /// Run a general discovery scan.
    async fn scan_devices(&self, duration: Option<Duration>) -> Result<ScanSummary>;

    /// Connect to a device by address.
    async fn connect_device(&self, address: &str) -> Result<ConnectedDevice>;

    /// Disconnect the connected device.
    async fn disconnect_device(&self) -> Result<ConnectedDevice>;

    /// Stop the active scan early.
    fn stop_scan(&self) -> bool;

    /// Remember a device.
    fn save_device(&self, address: &str, name: Option<&str>) -> Result<SavedDevice>;

    /// List remembered devices.
    fn list_previous_devices(&self) -> Result<Vec<SavedDevice>>;

    /// The connected device, if any.
    fn connected_device(&self) -> Option<ConnectedDevice>;

    /// Whether a scan holds the radio.
    fn is_scanning(&self) -> bool;

    /// Devices seen by the latest scan.
    fn cached_devices(&self) -> Vec<DeviceSummary>;
}

#[async_trait]
impl<D: RadioDriver> BluetoothService for ConnectionCoordinator<D> {
    async fn scan_devices(&self, duration: Option<Duration>) -> Result<ScanSummary> {
        Ok(self.scan(duration).await?.summary())
    }

    async fn connect_device(&self, address: &str) -> Result<ConnectedDevice> {
        self.connect(address).await
    }

    async fn disconnect_device(&self) -> Result<ConnectedDevice> {
        self.disconnect().await
    }

    fn stop_scan(&self) -> bool {
        ConnectionCoordinator::stop_scan(self)
    }

    fn save_device(&self, address: &str, name: Option<&str>) -> Result<SavedDevice> {
        self.save(address, name)
    }

    fn list_previous_devices(&self) -> Result<Vec<SavedDevice>> {
        self.list_previous()
    }

    fn connected_device(&self) -> Option<ConnectedDevice> {
        ConnectionCoordinator::connected_device(self)
    }

    fn is_scanning(&self) -> bool {
        ConnectionCoordinator::is_scanning(self)
    }

    fn cached_devices(&self) -> Vec<DeviceSummary> {
        ConnectionCoordinator::cached_devices(self)
    }
}
