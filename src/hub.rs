//! # Broadcast Hub
//!
//! Fans station events out to live viewers. Every subscriber gets its own
//! bounded queue; a subscriber that stops draining overflows alone and is
//! disconnected without slowing ingest or any other subscriber.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::event::StationEvent;

/// Opaque handle identifying one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A live event feed held by one viewer
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<StationEvent>,
}

impl Subscription {
    /// Identifier to pass back to [`BroadcastHub::unsubscribe`]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next event, or `None` once disconnected
    pub async fn recv(&mut self) -> Option<StationEvent> {
        self.rx.recv().await
    }
}

#[derive(Debug)]
struct SubscriberSlot {
    id: SubscriberId,
    tx: mpsc::Sender<StationEvent>,
}

#[derive(Debug)]
struct HubInner {
    subscribers: Vec<SubscriberSlot>,
    next_id: u64,
}

/// Fan-out point between the ingest pipeline and viewer sessions
#[derive(Debug)]
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    capacity: usize,
}

impl BroadcastHub {
    /// Create a hub whose subscribers each buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                subscribers: Vec::new(),
                next_id: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new subscriber and hand back its event feed
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.lock();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;

        let (tx, rx) = mpsc::channel(self.capacity);
        inner.subscribers.push(SubscriberSlot { id, tx });
        debug!("Subscriber {:?} attached", id);
        Subscription { id, rx }
    }

    /// Remove a subscriber; a second call with the same id is a no-op
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|slot| slot.id != id);
        if inner.subscribers.len() < before {
            debug!("Subscriber {:?} detached", id);
        }
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Deliver one event to every subscriber without blocking
    ///
    /// A subscriber whose queue is full is disconnected on the spot; its
    /// feed ends after the events already buffered. Subscribers that went
    /// away are pruned silently.
    pub fn publish(&self, event: &StationEvent) {
        let mut inner = self.lock();
        inner.subscribers.retain(|slot| {
            match slot.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Subscriber {:?} overflowed its event queue, disconnecting it",
                        slot.id
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {:?} hung up", slot.id);
                    false
                }
            }
        });
    }
}
