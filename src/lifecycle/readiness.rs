//! Readiness signal shared between the discovery loop and the health endpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifier of a readiness subscription.
pub type SubscriptionId = u64;

/// A boolean flag that publishes every mutation to its subscribers.
///
/// Publishing never blocks the writer: each subscriber owns a bounded buffer,
/// and a notification that does not fit is dropped. Subscribers that need the
/// latest value can always fall back to [`ReadinessSignal::load`].
#[derive(Debug, Clone, Default)]
pub struct ReadinessSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    value: AtomicBool,
    subscribers: DashMap<SubscriptionId, mpsc::Sender<bool>>,
    next_id: AtomicU64,
}

impl ReadinessSignal {
    /// Create a signal that starts out not ready.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> bool {
        self.inner.value.load(Ordering::SeqCst)
    }

    /// Set the value and notify subscribers.
    pub fn store(&self, value: bool) {
        self.inner.value.store(value, Ordering::SeqCst);
        self.inner.publish(value);
    }

    /// Set the value, notify subscribers and return the previous value.
    pub fn swap(&self, value: bool) -> bool {
        let previous = self.inner.value.swap(value, Ordering::SeqCst);
        self.inner.publish(value);
        previous
    }

    /// Register a subscriber receiving every new value.
    ///
    /// `buffer` is the number of notifications held for a slow subscriber
    /// before further ones are dropped.
    pub fn subscribe(&self, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, tx);
        Subscription {
            id,
            rx,
            signal: Arc::downgrade(&self.inner),
        }
    }

    /// Detach a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Wait until the signal holds `expected`.
    pub async fn wait_for(&self, expected: bool) {
        let mut subscription = self.subscribe(8);
        if self.load() == expected {
            return;
        }
        while let Some(value) = subscription.recv().await {
            if value == expected || self.load() == expected {
                return;
            }
        }
    }
}

impl Inner {
    fn publish(&self, value: bool) {
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(value) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = *entry.key(), value, "Readiness subscriber lagging, notification dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
        }
    }
}

/// Receiving end of a readiness subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<bool>,
    signal: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next published value. `None` once the signal is gone or the
    /// subscription was detached.
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }

    /// Next buffered value, if any.
    pub fn try_recv(&mut self) -> Option<bool> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.signal.upgrade() {
            inner.subscribers.remove(&self.id);
        }
    }
}
