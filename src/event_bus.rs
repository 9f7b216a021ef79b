//! Publish/subscribe fan-out for coordinator events
//!
//! Each subscriber picks the categories it cares about and receives events
//! through its own unbounded channel. The returned [`Subscription`] owns the
//! receiving end; dropping it removes the subscriber from the bus, so
//! listeners never outlive the component that registered them.

use crate::events::{EventCategory, EventEnvelope};
use crate::utils::lock_mutex_recover;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

struct Subscriber {
    id: u64,
    categories: HashSet<EventCategory>,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: u64) {
        let mut subscribers = lock_mutex_recover(&self.subscribers);
        subscribers.retain(|s| s.id != id);
    }
}

/// Fans events out to category subscribers
#[derive(Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the given categories
    pub fn subscribe(&self, categories: &[EventCategory]) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subscribers = lock_mutex_recover(&self.inner.subscribers);
            subscribers.push(Subscriber {
                id,
                categories: categories.iter().copied().collect(),
                tx,
            });
        }
        log::debug!("[EventBus] Subscriber {} registered for {:?}", id, categories);
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe to every category
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&EventCategory::ALL)
    }

    /// Deliver envelopes in order. Subscribers whose receiver is gone are pruned.
    pub fn publish(&self, envelopes: &[EventEnvelope]) {
        if envelopes.is_empty() {
            return;
        }

        let mut subscribers = lock_mutex_recover(&self.inner.subscribers);
        subscribers.retain(|subscriber| {
            for envelope in envelopes {
                if !subscriber.categories.contains(&envelope.event.category()) {
                    continue;
                }
                if subscriber.tx.send(envelope.clone()).is_err() {
                    log::debug!("[EventBus] Pruning closed subscriber {}", subscriber.id);
                    return false;
                }
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock_mutex_recover(&self.inner.subscribers).len()
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Wait for the next event; `None` once the bus is gone and the queue is empty
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// All queued events, in delivery order
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            events.push(envelope);
        }
        events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
            log::debug!("[EventBus] Subscriber {} released", self.id);
        }
    }
}
