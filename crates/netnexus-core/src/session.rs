//! Scan session lifecycle.
//!
//! A [`ScanSession`] owns one discovery operation on the radio:
//!
//! ```text
//! Idle -> Scanning -> Stopping -> Completed
//!   \________________________________/  (start failed)
//! ```
//!
//! Three terminal events race while a session is `Scanning`: the duration
//! timer, a discovery event matching the session's target, and a stop
//! request (manual stop or preemption by a connect). The first one observed
//! resolves the session; the others become no-ops.
//!
//! The radio supports one discovery operation at a time. [`ScanSlot`] is the
//! single mutual-exclusion flag guarding it: a session can only be built from
//! a [`ScanLease`], and the lease clears the flag when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netnexus_types::{DeviceAddress, DeviceSummary};

use crate::cache::{DiscoveredDevice, DiscoveryCache};
use crate::driver::{DiscoveryFilter, RadioDriver};
use crate::error::{Error, Result};
use crate::events::DiscoveryEvent;

/// Lifecycle state of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Created, discovery not started.
    Idle,
    /// Discovery running.
    Scanning,
    /// Terminal event observed, unregistering and stopping the radio.
    Stopping,
    /// Radio released.
    Completed,
}

impl ScanState {
    /// Whether the session currently holds the radio.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scanning | Self::Stopping)
    }

    fn can_advance_to(self, next: ScanState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Scanning)
                | (Self::Idle, Self::Completed)
                | (Self::Scanning, Self::Stopping)
                | (Self::Stopping, Self::Completed)
        )
    }
}

/// Why a scan was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPurpose {
    /// General discovery requested by a caller.
    Discovery,
    /// Short search for one address on behalf of a connect request.
    Targeted(DeviceAddress),
}

/// Why a stop was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A caller invoked stop.
    Requested,
    /// A connect request took over the radio.
    Preempted,
}

/// How a session resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The duration bound elapsed.
    Expired,
    /// The targeted address was seen.
    TargetFound,
    /// A caller stopped the scan early.
    Stopped,
    /// A connect request interrupted the scan.
    Preempted,
}

impl Termination {
    /// Whether the scan ended before its window elapsed for a reason other
    /// than finding its target.
    pub fn is_interrupted(self) -> bool {
        matches!(self, Self::Stopped | Self::Preempted)
    }
}

/// Result of a completed scan session.
#[derive(Debug, Clone)]
pub struct ScanReport<H> {
    /// Session id.
    pub id: u64,
    /// How the session resolved.
    pub termination: Termination,
    /// The matched device for a targeted session that found its target.
    pub matched: Option<DiscoveredDevice<H>>,
    /// Every device cached during the session, in discovery order.
    pub devices: Vec<DiscoveredDevice<H>>,
    /// Time from discovery start to resolution.
    pub elapsed: Duration,
}

impl<H> ScanReport<H> {
    /// Serializable view without driver handles.
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            devices: self.devices.iter().map(DiscoveredDevice::summary).collect(),
            termination: self.termination,
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Serializable scan result returned across the coordinator boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Devices found, in discovery order.
    pub devices: Vec<DeviceSummary>,
    /// How the scan resolved.
    pub termination: Termination,
    /// Scan duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Information about the scan currently holding the radio.
#[derive(Debug, Clone)]
pub struct ActiveScan {
    /// Session id.
    pub id: u64,
    /// Why the scan was started.
    pub purpose: ScanPurpose,
    /// When the slot was acquired.
    pub acquired_at: Instant,
}

/// One-shot stop request shared between a session and the slot.
///
/// Only the first reason is recorded.
#[derive(Debug, Clone, Default)]
struct StopSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopSignal {
    fn request(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    async fn requested(&self) -> StopReason {
        self.token.cancelled().await;
        self.reason.get().copied().unwrap_or(StopReason::Requested)
    }
}

#[derive(Debug)]
struct SlotEntry {
    info: ActiveScan,
    stop: StopSignal,
    done: watch::Receiver<bool>,
}

/// The radio's "scan active" flag.
///
/// Check-and-set happens under one short mutex section, so two requests can
/// never both observe the slot as free.
#[derive(Debug, Default)]
pub struct ScanSlot {
    active: Mutex<Option<SlotEntry>>,
    next_id: AtomicU64,
}

impl ScanSlot {
    /// Create an empty slot.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entry(&self) -> MutexGuard<'_, Option<SlotEntry>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn install(self: &Arc<Self>, slot: &mut Option<SlotEntry>, purpose: ScanPurpose) -> ScanLease {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (done_tx, done_rx) = watch::channel(false);
        let stop = StopSignal::default();
        *slot = Some(SlotEntry {
            info: ActiveScan {
                id,
                purpose,
                acquired_at: Instant::now(),
            },
            stop: stop.clone(),
            done: done_rx,
        });
        ScanLease {
            slot: Arc::clone(self),
            id,
            stop,
            done: done_tx,
        }
    }

    /// Claim the radio, failing if any scan is active.
    pub fn try_acquire(self: &Arc<Self>, purpose: ScanPurpose) -> Result<ScanLease> {
        let mut slot = self.entry();
        if slot.is_some() {
            return Err(Error::AlreadyScanning);
        }
        Ok(self.install(&mut slot, purpose))
    }

    /// Claim the radio, preempting a general discovery scan if one is active.
    ///
    /// Waits until the preempted session has finished its stop sequence.
    /// Fails with [`Error::AlreadyScanning`] if a targeted scan holds the
    /// radio, since that scan already serves a connect request.
    pub async fn acquire_preempting(self: &Arc<Self>, purpose: ScanPurpose) -> Result<ScanLease> {
        loop {
            let mut done = {
                let mut slot = self.entry();
                if slot.is_none() {
                    return Ok(self.install(&mut slot, purpose));
                }
                self.preempt_locked(&slot)?
            };
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Stop a general discovery scan if one is active and wait for it to
    /// release the radio.
    pub async fn preempt_discovery(&self) -> Result<()> {
        loop {
            let mut done = {
                let slot = self.entry();
                if slot.is_none() {
                    return Ok(());
                }
                self.preempt_locked(&slot)?
            };
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    fn preempt_locked(&self, slot: &Option<SlotEntry>) -> Result<watch::Receiver<bool>> {
        match slot {
            Some(entry) if entry.info.purpose == ScanPurpose::Discovery => {
                if entry.stop.request(StopReason::Preempted) {
                    info!("Interrupting scan {} for a connection request", entry.info.id);
                }
                Ok(entry.done.clone())
            }
            Some(_) => Err(Error::AlreadyScanning),
            None => {
                let (_, done) = watch::channel(true);
                Ok(done)
            }
        }
    }

    /// Ask the active scan to stop early. Returns `false` if none is active.
    pub fn request_stop(&self) -> bool {
        match self.entry().as_ref() {
            Some(entry) => {
                entry.stop.request(StopReason::Requested);
                true
            }
            None => false,
        }
    }

    /// The scan currently holding the radio.
    pub fn active(&self) -> Option<ActiveScan> {
        self.entry().as_ref().map(|entry| entry.info.clone())
    }

    /// Whether any scan holds the radio.
    pub fn is_active(&self) -> bool {
        self.entry().is_some()
    }
}

/// Exclusive claim on the radio for one scan session.
#[derive(Debug)]
pub struct ScanLease {
    slot: Arc<ScanSlot>,
    id: u64,
    stop: StopSignal,
    done: watch::Sender<bool>,
}

impl ScanLease {
    /// Session id assigned by the slot.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ScanLease {
    fn drop(&mut self) {
        {
            let mut slot = self.slot.entry();
            if slot.as_ref().is_some_and(|entry| entry.info.id == self.id) {
                *slot = None;
            }
        }
        self.done.send_replace(true);
    }
}

/// Radio state shared by the coordinator and its sessions.
pub(crate) struct Radio<D: RadioDriver> {
    pub(crate) driver: Arc<D>,
    pub(crate) cache: Mutex<DiscoveryCache<D::Handle>>,
    pub(crate) slot: Arc<ScanSlot>,
    /// Held for writing around stop-discovery, for reading around
    /// connect/disconnect.
    pub(crate) gate: RwLock<()>,
}

impl<D: RadioDriver> Radio<D> {
    pub(crate) fn new(driver: Arc<D>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            cache: Mutex::new(DiscoveryCache::new()),
            slot: ScanSlot::new(),
            gate: RwLock::new(()),
        })
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, DiscoveryCache<D::Handle>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One discovery operation on the radio.
pub struct ScanSession<D: RadioDriver> {
    radio: Arc<Radio<D>>,
    lease: Option<ScanLease>,
    stop: StopSignal,
    state: ScanState,
    duration: Duration,
    target: Option<DeviceAddress>,
}

impl<D: RadioDriver> ScanSession<D> {
    pub(crate) fn new(
        radio: Arc<Radio<D>>,
        lease: ScanLease,
        duration: Duration,
        target: Option<DeviceAddress>,
    ) -> Self {
        Self {
            radio,
            stop: lease.stop.clone(),
            lease: Some(lease),
            state: ScanState::Idle,
            duration,
            target,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    fn id(&self) -> u64 {
        self.lease.as_ref().map_or(0, ScanLease::id)
    }

    fn advance(&mut self, next: ScanState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid scan transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Scan {}: {:?} -> {:?}", self.id(), self.state, next);
        self.state = next;
    }

    /// Cache the event; return the cached entry if it matches the target.
    fn absorb(&self, event: DiscoveryEvent<D::Handle>) -> Option<DiscoveredDevice<D::Handle>> {
        let is_target = self.target.as_ref() == Some(&event.address);
        let device = DiscoveredDevice::from_event(event);
        let address = device.address.clone();

        let mut cache = self.radio.cache();
        let name = device.name.clone();
        if cache.upsert(device) {
            debug!("Discovered: {} [{}]", name, address);
        }

        if is_target {
            cache.lookup(&address).cloned()
        } else {
            None
        }
    }

    /// Run the session to completion and release the radio.
    pub(crate) async fn run(mut self) -> Result<ScanReport<D::Handle>> {
        let stop = self.stop.clone();
        self.radio.cache().clear();

        // Register before starting so no early advertisement is missed
        let mut subscription = self.radio.driver.subscribe();
        let filter = match &self.target {
            Some(target) => DiscoveryFilter::target(target.clone()),
            None => DiscoveryFilter::all(),
        };

        if let Err(e) = self.radio.driver.start_discovery(&filter).await {
            warn!("Bluetooth scan failed to start: {}", e);
            self.advance(ScanState::Completed);
            return Err(e);
        }

        let started_at = Instant::now();
        self.advance(ScanState::Scanning);
        match &self.target {
            Some(target) => info!(
                "Searching for {} ({}s window)...",
                target,
                self.duration.as_secs_f32()
            ),
            None => info!(
                "Bluetooth scanning started ({}s)...",
                self.duration.as_secs_f32()
            ),
        }

        let deadline = tokio::time::sleep(self.duration);
        tokio::pin!(deadline);
        let mut events_open = true;
        let mut matched = None;

        let termination = loop {
            tokio::select! {
                biased;
                reason = stop.requested() => {
                    break match reason {
                        StopReason::Requested => Termination::Stopped,
                        StopReason::Preempted => Termination::Preempted,
                    };
                }
                () = &mut deadline => break Termination::Expired,
                event = subscription.next(), if events_open => match event {
                    Some(event) => {
                        if let Some(device) = self.absorb(event) {
                            matched = Some(device);
                            break Termination::TargetFound;
                        }
                    }
                    None => {
                        warn!("Discovery event stream closed during scan {}", self.id());
                        events_open = false;
                    }
                },
            }
        };
        let elapsed = started_at.elapsed();

        self.advance(ScanState::Stopping);
        drop(subscription);
        {
            let _gate = self.radio.gate.write().await;
            if let Err(e) = self.radio.driver.stop_discovery().await {
                // Results collected so far stay valid
                warn!("Failed to stop discovery after scan {}: {}", self.id(), e);
            }
        }
        self.advance(ScanState::Completed);

        let devices = self.radio.cache().snapshot();
        info!(
            "Bluetooth scanning stopped ({:?}): {} device(s) in {:?}",
            termination,
            devices.len(),
            elapsed
        );

        let report = ScanReport {
            id: self.id(),
            termination,
            matched,
            devices,
            elapsed,
        };
        self.lease.take();
        Ok(report)
    }
}

impl<D: RadioDriver> Drop for ScanSession<D> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        if !self.state.is_active() {
            return;
        }

        // The caller went away mid-scan; release the radio in the background
        // and keep the slot claimed until discovery has actually stopped.
        warn!("Scan {} abandoned while {:?}", lease.id(), self.state);
        let radio = Arc::clone(&self.radio);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _gate = radio.gate.write().await;
                    if let Err(e) = radio.driver.stop_discovery().await {
                        warn!("Failed to stop abandoned discovery: {}", e);
                    }
                    drop(lease);
                });
            }
            Err(_) => warn!("No tokio runtime available to stop abandoned discovery"),
        }
    }
}
