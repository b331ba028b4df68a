//! Discovery event plumbing between radio drivers and scan sessions.
//!
//! Drivers publish a [`DiscoveryEvent`] for every advertisement they see
//! through a [`DiscoveryHub`]. A scan session registers for events by taking a
//! [`Subscription`]; dropping the subscription unregisters it, so a handler
//! can never outlive the session that owns it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use netnexus_types::DeviceAddress;

/// A device reported by the radio during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent<H> {
    /// Normalized hardware address.
    pub address: DeviceAddress,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Driver-level handle needed to connect.
    pub handle: H,
}

type Senders<H> = Mutex<Vec<(u64, mpsc::UnboundedSender<DiscoveryEvent<H>>)>>;

#[derive(Debug)]
struct Registry<H> {
    next_id: AtomicU64,
    senders: Senders<H>,
}

impl<H> Registry<H> {
    fn senders(&self) -> MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<DiscoveryEvent<H>>)>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out point for discovery events.
///
/// Every subscription gets its own unbounded queue, so a slow handler never
/// loses events.
#[derive(Debug)]
pub struct DiscoveryHub<H> {
    registry: Arc<Registry<H>>,
}

impl<H> Clone for DiscoveryHub<H> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<H: Clone> DiscoveryHub<H> {
    /// Create a hub with no subscriptions.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                senders: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a new handler.
    pub fn subscribe(&self) -> Subscription<H> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.registry.senders().push((id, sender));
        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Publish an event. Events with no active subscription are dropped.
    pub fn publish(&self, event: DiscoveryEvent<H>) {
        let mut senders = self.registry.senders();
        if senders.is_empty() {
            debug!("Discovery event dropped: no active subscription");
            return;
        }
        senders.retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.senders().len()
    }
}

impl<H: Clone> Default for DiscoveryHub<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered discovery handler. Unregisters on drop.
#[derive(Debug)]
pub struct Subscription<H> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<DiscoveryEvent<H>>,
    registry: Weak<Registry<H>>,
}

impl<H> Subscription<H> {
    /// Wait for the next event in arrival order.
    ///
    /// Returns `None` once the driver side has gone away.
    pub async fn next(&mut self) -> Option<DiscoveryEvent<H>> {
        self.receiver.recv().await
    }
}

impl<H> Drop for Subscription<H> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.senders().retain(|(id, _)| *id != self.id);
        }
    }
}
