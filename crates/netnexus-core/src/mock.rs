//! Mock radio implementation for testing.
//!
//! [`MockRadio`] implements [`RadioDriver`] without hardware. Advertisements
//! are scripted relative to the moment discovery starts, so tests running on
//! a paused tokio clock get deterministic timing.
//!
//! # Features
//!
//! - **Scripted discovery**: queue advertisements with [`MockRadioBuilder::advertise`]
//! - **Failure injection**: make start, stop, or connect fail
//! - **Latency simulation**: delay connects to simulate slow pairing
//! - **Call counters**: assert how often each driver operation ran

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use netnexus_types::DeviceAddress;

use crate::driver::{DiscoveryFilter, RadioDriver};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DiscoveryEvent, DiscoveryHub, Subscription};

/// Handle the mock radio hands out for discovered devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    /// Address the advertisement carried.
    pub address: DeviceAddress,
    /// Advertised name.
    pub name: Option<String>,
    /// Order in which the radio reported this advertisement, starting at 1.
    pub seq: u64,
}

#[derive(Debug, Clone)]
struct Advertisement {
    after: Duration,
    address: DeviceAddress,
    name: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scripted radio for testing.
pub struct MockRadio {
    hub: DiscoveryHub<MockHandle>,
    script: Vec<Advertisement>,
    seq: Arc<AtomicU64>,
    discovering: AtomicBool,
    playback: Mutex<Option<CancellationToken>>,
    last_filter: Mutex<Option<DiscoveryFilter>>,
    connected: Mutex<Option<MockHandle>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    connect_failure: Mutex<Option<ConnectionFailureReason>>,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Simulated stop-discovery latency in milliseconds.
    stop_latency_ms: AtomicU64,
    stopping: AtomicBool,
    connects_during_stop: AtomicU32,
    start_count: AtomicU32,
    stop_count: AtomicU32,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRadio")
            .field("script", &self.script.len())
            .field("discovering", &self.discovering.load(Ordering::Relaxed))
            .field("connected", &*lock(&self.connected))
            .finish()
    }
}

impl MockRadio {
    /// Create a mock radio that never reports any device.
    pub fn new() -> Self {
        MockRadioBuilder::new().build()
    }

    /// Start building a scripted mock radio.
    pub fn builder() -> MockRadioBuilder {
        MockRadioBuilder::new()
    }

    /// Report a device immediately, outside the script.
    ///
    /// Returns `false` (and drops the advertisement) if discovery is not running.
    pub fn emit(&self, address: &str, name: Option<&str>) -> bool {
        if !self.is_discovering() {
            return false;
        }
        let Ok(address) = DeviceAddress::parse(address) else {
            return false;
        };
        publish(
            &self.hub,
            &self.seq,
            Advertisement {
                after: Duration::ZERO,
                address,
                name: name.map(str::to_string),
            },
        );
        true
    }

    /// Whether discovery is currently running.
    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// The device currently connected, if any.
    pub fn connected(&self) -> Option<MockHandle> {
        lock(&self.connected).clone()
    }

    /// The filter passed to the most recent start.
    pub fn last_filter(&self) -> Option<DiscoveryFilter> {
        lock(&self.last_filter).clone()
    }

    /// Number of start-discovery calls.
    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }

    /// Number of stop-discovery calls.
    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }

    /// Number of connect calls.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Number of disconnect calls.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    /// Number of connect calls issued while a stop-discovery was running.
    pub fn connects_during_stop(&self) -> u32 {
        self.connects_during_stop.load(Ordering::Relaxed)
    }

    /// Make the next connects fail with `reason`, or succeed again with `None`.
    pub fn set_connect_failure(&self, reason: Option<ConnectionFailureReason>) {
        *lock(&self.connect_failure) = reason;
    }

    /// Make stop-discovery fail.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated stop-discovery latency.
    pub fn set_stop_latency(&self, latency: Duration) {
        self.stop_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn cancel_playback(&self) {
        if let Some(token) = lock(&self.playback).take() {
            token.cancel();
        }
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockRadio {
    fn drop(&mut self) {
        self.cancel_playback();
    }
}

fn publish(hub: &DiscoveryHub<MockHandle>, seq: &AtomicU64, ad: Advertisement) {
    let seq = seq.fetch_add(1, Ordering::SeqCst) + 1;
    debug!("Mock advertisement #{}: {}", seq, ad.address);
    hub.publish(DiscoveryEvent {
        address: ad.address.clone(),
        name: ad.name.clone(),
        handle: MockHandle {
            address: ad.address,
            name: ad.name,
            seq,
        },
    });
}

#[async_trait]
impl RadioDriver for MockRadio {
    type Handle = MockHandle;

    async fn start_discovery(&self, filter: &DiscoveryFilter) -> Result<()> {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_start.load(Ordering::Relaxed) {
            return Err(Error::DiscoveryFailed("mock adapter refused to scan".to_string()));
        }
        if self.discovering.swap(true, Ordering::SeqCst) {
            return Err(Error::DiscoveryFailed("discovery already running".to_string()));
        }
        *lock(&self.last_filter) = Some(filter.clone());

        let token = CancellationToken::new();
        *lock(&self.playback) = Some(token.clone());

        let hub = self.hub.clone();
        let seq = Arc::clone(&self.seq);
        let script = self.script.clone();
        let started = Instant::now();
        tokio::spawn(async move {
            for ad in script {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep_until(started + ad.after) => {}
                }
                publish(&hub, &seq, ad);
            }
        });
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.cancel_playback();
        let latency = self.stop_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            self.stopping.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(latency)).await;
            self.stopping.store(false, Ordering::SeqCst);
        }
        self.discovering.store(false, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::Relaxed) {
            return Err(Error::DriverStop("mock adapter failed to stop".to_string()));
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<MockHandle> {
        self.hub.subscribe()
    }

    async fn connect(&self, handle: &MockHandle) -> Result<Option<String>> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        if self.stopping.load(Ordering::SeqCst) {
            self.connects_during_stop.fetch_add(1, Ordering::Relaxed);
        }

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let failure = lock(&self.connect_failure).clone();
        if let Some(reason) = failure {
            return Err(Error::connect_failed(handle.address.display(), reason));
        }

        *lock(&self.connected) = Some(handle.clone());
        Ok(handle.name.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
        match lock(&self.connected).take() {
            Some(_) => Ok(()),
            None => Err(Error::NotConnected),
        }
    }
}

/// Builder for creating scripted mock radios.
#[derive(Debug, Clone)]
pub struct MockRadioBuilder {
    script: Vec<Advertisement>,
    fail_start: bool,
    fail_stop: bool,
    connect_failure: Option<ConnectionFailureReason>,
    connect_latency: Duration,
    stop_latency: Duration,
}

impl Default for MockRadioBuilder {
    fn default() -> Self {
        Self {
            script: Vec::new(),
            fail_start: false,
            fail_stop: false,
            connect_failure: None,
            connect_latency: Duration::ZERO,
            stop_latency: Duration::ZERO,
        }
    }
}

impl MockRadioBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `address` `after` discovery starts. Repeat to script duplicates.
    ///
    /// Invalid addresses are ignored.
    #[must_use]
    pub fn advertise(mut self, after: Duration, address: &str, name: Option<&str>) -> Self {
        if let Ok(address) = DeviceAddress::parse(address) {
            self.script.push(Advertisement {
                after,
                address,
                name: name.map(str::to_string),
            });
        }
        self
    }

    /// Fail every start-discovery call.
    #[must_use]
    pub fn fail_start(mut self, fail: bool) -> Self {
        self.fail_start = fail;
        self
    }

    /// Fail every stop-discovery call.
    #[must_use]
    pub fn fail_stop(mut self, fail: bool) -> Self {
        self.fail_stop = fail;
        self
    }

    /// Fail every connect with `reason`.
    #[must_use]
    pub fn connect_failure(mut self, reason: ConnectionFailureReason) -> Self {
        self.connect_failure = Some(reason);
        self
    }

    /// Delay every connect.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Delay every stop-discovery.
    #[must_use]
    pub fn stop_latency(mut self, latency: Duration) -> Self {
        self.stop_latency = latency;
        self
    }

    /// Build the mock radio.
    #[must_use]
    pub fn build(mut self) -> MockRadio {
        self.script.sort_by_key(|ad| ad.after);
        MockRadio {
            hub: DiscoveryHub::new(),
            script: self.script,
            seq: Arc::new(AtomicU64::new(0)),
            discovering: AtomicBool::new(false),
            playback: Mutex::new(None),
            last_filter: Mutex::new(None),
            connected: Mutex::new(None),
            fail_start: AtomicBool::new(self.fail_start),
            fail_stop: AtomicBool::new(self.fail_stop),
            connect_failure: Mutex::new(self.connect_failure),
            connect_latency_ms: AtomicU64::new(self.connect_latency.as_millis() as u64),
            stop_latency_ms: AtomicU64::new(self.stop_latency.as_millis() as u64),
            stopping: AtomicBool::new(false),
            connects_during_stop: AtomicU32::new(0),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_playback() {
        let radio = MockRadio::builder()
            .advertise(Duration::from_secs(2), "aa:00", Some("Second"))
            .advertise(Duration::from_secs(1), "bb:00", Some("First"))
            .build();

        let mut sub = radio.subscribe();
        let started = Instant::now();
        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first.name.as_deref(), Some("First"));
        assert_eq!(first.handle.seq, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(1));

        let second = sub.next().await.unwrap();
        assert_eq!(second.address.key(), "aa:00");
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_playback() {
        let radio = MockRadio::builder()
            .advertise(Duration::from_secs(5), "aa:00", None)
            .build();

        let mut sub = radio.subscribe();
        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();
        radio.stop_discovery().await.unwrap();
        assert!(!radio.is_discovering());

        let next = tokio::time::timeout(Duration::from_secs(10), sub.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let radio = MockRadio::new();
        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();
        let err = radio.start_discovery(&DiscoveryFilter::all()).await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed(_)));
        assert_eq!(radio.start_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_only_while_discovering() {
        let radio = MockRadio::new();
        let mut sub = radio.subscribe();
        assert!(!radio.emit("aa:00", None));

        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();
        assert!(radio.emit("AA:00", Some("Live")));
        let event = sub.next().await.unwrap();
        assert_eq!(event.address.key(), "aa:00");
        assert_eq!(event.name.as_deref(), Some("Live"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let radio = MockRadio::builder()
            .fail_start(true)
            .fail_stop(true)
            .connect_failure(ConnectionFailureReason::Rejected)
            .build();

        assert!(radio.start_discovery(&DiscoveryFilter::all()).await.is_err());
        assert!(matches!(
            radio.stop_discovery().await,
            Err(Error::DriverStop(_))
        ));

        let handle = MockHandle {
            address: DeviceAddress::parse("aa:00").unwrap(),
            name: None,
            seq: 1,
        };
        let err = radio.connect(&handle).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectFailed {
                reason: ConnectionFailureReason::Rejected,
                ..
            }
        ));

        radio.set_connect_failure(None);
        assert!(radio.connect(&handle).await.is_ok());
        assert_eq!(radio.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let radio = MockRadio::new();
        let handle = MockHandle {
            address: DeviceAddress::parse("aa:00").unwrap(),
            name: Some("Speaker".to_string()),
            seq: 1,
        };

        assert!(matches!(radio.disconnect().await, Err(Error::NotConnected)));
        let name = radio.connect(&handle).await.unwrap();
        assert_eq!(name.as_deref(), Some("Speaker"));
        assert_eq!(radio.connected(), Some(handle));

        radio.disconnect().await.unwrap();
        assert!(radio.connected().is_none());
        assert_eq!(radio.disconnect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_latency() {
        let radio = MockRadio::builder()
            .connect_latency(Duration::from_millis(300))
            .build();
        let handle = MockHandle {
            address: DeviceAddress::parse("aa:00").unwrap(),
            name: None,
            seq: 1,
        };

        let started = Instant::now();
        radio.connect(&handle).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_latency_counts_overlapping_connects() {
        let radio = Arc::new(
            MockRadio::builder()
                .stop_latency(Duration::from_secs(2))
                .build(),
        );
        let handle = MockHandle {
            address: DeviceAddress::parse("aa:00").unwrap(),
            name: None,
            seq: 1,
        };
        radio.start_discovery(&DiscoveryFilter::all()).await.unwrap();

        let stop = tokio::spawn({
            let radio = Arc::clone(&radio);
            async move { radio.stop_discovery().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(radio.is_discovering());
        radio.connect(&handle).await.unwrap();
        assert_eq!(radio.connects_during_stop(), 1);

        stop.await.unwrap().unwrap();
        assert!(!radio.is_discovering());
        radio.connect(&handle).await.unwrap();
        assert_eq!(radio.connects_during_stop(), 1);
        assert_eq!(radio.connect_count(), 2);
    }
}
