//! Bounded in-memory broadcast for stock notifications.
//!
//! Every subscriber owns a fixed-size queue. Publishing never blocks the
//! committing writer: a full queue skips that subscriber and bumps its
//! `missed` counter, and a dropped subscription is pruned. Consumers that
//! fall behind rebuild from the movement ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

/// Per-subscriber queue depth used by [`InMemoryEventBus::new`].
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Subscriber<M> {
    tx: SyncSender<M>,
    missed: Arc<AtomicU64>,
}

#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    capacity: usize,
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// A capacity of zero is raised to one; a rendezvous queue would drop
    /// everything nobody is blocked on.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscriptions (dead ones are pruned on publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|sub| match sub.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                sub.missed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let missed = Arc::new(AtomicU64::new(0));

        // A poisoned lock still hands out a subscription; it just never
        // receives anything.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber {
                tx,
                missed: Arc::clone(&missed),
            });
        }

        Subscription::tracked(rx, missed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_each_message() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();
        bus.publish(8).unwrap();

        assert_eq!(a.drain(), vec![7, 8]);
        assert_eq!(b.drain(), vec![7, 8]);
        assert_eq!(a.missed(), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap(), 1);
    }

    #[test]
    fn full_queue_skips_only_the_slow_subscriber() {
        let bus = InMemoryEventBus::<u32>::with_capacity(2);
        let slow = bus.subscribe();
        let fast = bus.subscribe();

        for n in 1..=3 {
            bus.publish(n).unwrap();
            if n < 3 {
                assert_eq!(fast.try_recv().unwrap(), n);
            }
        }
        assert_eq!(fast.try_recv().unwrap(), 3);
        assert_eq!(fast.missed(), 0);

        assert_eq!(slow.drain(), vec![1, 2]);
        assert_eq!(slow.missed(), 1);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let bus = InMemoryEventBus::<u32>::with_capacity(0);
        assert_eq!(bus.capacity(), 1);
        let sub = bus.subscribe();
        bus.publish(5).unwrap();
        assert_eq!(sub.try_recv().unwrap(), 5);
    }
}
