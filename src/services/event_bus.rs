//! Generic broadcast/sequence-number pub-sub primitive backing the
//! Monitor's subscriber fan-out (§4.6).
//!
//! Delivery is best-effort: a subscriber that falls behind the channel's
//! capacity silently drops the oldest backlog rather than blocking
//! publishers, matching `tokio::sync::broadcast`'s native lagged-receiver
//! behavior. Each subscriber tracks its own last-seen sequence number so
//! callers can detect and log how many messages they missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Monotonically increasing sequence number assigned by the bus at
/// publish time, shared across all subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// Envelope wrapping a published payload with its assigned sequence
/// number.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub sequence: SequenceNumber,
    pub payload: T,
}

#[derive(Debug, Clone, Copy)]
pub struct EventBusConfig {
    /// Ring buffer capacity; a lagging subscriber drops messages once the
    /// publisher has produced this many beyond its last read.
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// A broadcast channel with bus-assigned sequence numbers.
pub struct EventBus<T: Clone + Send + 'static> {
    sender: broadcast::Sender<Envelope<T>>,
    next_sequence: Arc<AtomicU64>,
    last: Mutex<Option<Envelope<T>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity);
        Self {
            sender,
            next_sequence: Arc::new(AtomicU64::new(0)),
            last: Mutex::new(None),
        }
    }

    /// Publish `payload`, stamping it with the next sequence number.
    /// Returns the number of subscribers that received it; `0` is not an
    /// error, it just means nobody was listening.
    pub fn publish(&self, payload: T) -> SequenceNumber {
        let seq = SequenceNumber(self.next_sequence.fetch_add(1, Ordering::SeqCst));
        let envelope = Envelope {
            sequence: seq,
            payload,
        };
        let mut last = self.last.lock().expect("event bus mutex poisoned");
        *last = Some(envelope.clone());
        let _ = self.sender.send(envelope);
        drop(last);
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope<T>> {
        self.sender.subscribe()
    }

    /// Subscribe for catch-up-then-live delivery (§7): returns the most
    /// recently published envelope, if any, alongside a receiver that
    /// will only ever see envelopes published after this call. Holding
    /// `last`'s lock across both steps means no publish can land in the
    /// gap between reading the snapshot and subscribing.
    pub fn subscribe_with_catchup(&self) -> (Option<Envelope<T>>, broadcast::Receiver<Envelope<T>>) {
        let last = self.last.lock().expect("event bus mutex poisoned");
        let snapshot = last.clone();
        let rx = self.sender.subscribe();
        (snapshot, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_assigned_sequence_numbers() {
        let bus: EventBus<&'static str> = EventBus::new(EventBusConfig::default());
        let mut rx = bus.subscribe();

        bus.publish("first");
        bus.publish("second");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, SequenceNumber(0));
        assert_eq!(second.sequence, SequenceNumber(1));
        assert_eq!(first.payload, "first");
    }

    #[tokio::test]
    async fn late_subscriber_misses_prior_publishes() {
        let bus: EventBus<&'static str> = EventBus::new(EventBusConfig::default());
        bus.publish("before");
        let mut rx = bus.subscribe();
        bus.publish("after");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload, "after");
    }

    #[tokio::test]
    async fn catchup_subscriber_sees_last_value_then_live_stream() {
        let bus: EventBus<&'static str> = EventBus::new(EventBusConfig::default());
        bus.publish("before");

        let (snapshot, mut rx) = bus.subscribe_with_catchup();
        assert_eq!(snapshot.unwrap().payload, "before");

        bus.publish("after");
        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload, "after");
    }

    #[test]
    fn catchup_subscriber_gets_none_when_bus_is_empty() {
        let bus: EventBus<&'static str> = EventBus::new(EventBusConfig::default());
        let (snapshot, _rx) = bus.subscribe_with_catchup();
        assert!(snapshot.is_none());
    }

    #[test]
    fn subscriber_count_tracks_active_receivers() {
        let bus: EventBus<&'static str> = EventBus::new(EventBusConfig::default());
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
