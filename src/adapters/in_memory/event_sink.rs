//! In-process `EventSink` built on the generic `EventBus` primitive.
//!
//! Subscribers (the CLI's `monitor subscribe`, in-process test harnesses)
//! get snapshots and alerts fanned out over broadcast channels instead of
//! shipping them to an external system.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::error::EventSinkResult;
use crate::domain::models::{Alert, Snapshot};
use crate::domain::ports::EventSink;
use crate::services::event_bus::{Envelope, EventBus, EventBusConfig};

/// `EventSink` that fans published snapshots and alerts out to any number
/// of in-process subscribers over bounded broadcast channels.
pub struct InMemoryEventSink {
    snapshots: EventBus<Snapshot>,
    alerts: EventBus<Alert>,
}

impl InMemoryEventSink {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            snapshots: EventBus::new(config),
            alerts: EventBus::new(config),
        }
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<Envelope<Snapshot>> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Envelope<Alert>> {
        self.alerts.subscribe()
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish_snapshot(&self, snapshot: &Snapshot) -> EventSinkResult<()> {
        self.snapshots.publish(snapshot.clone());
        Ok(())
    }

    async fn publish_alert(&self, alert: &Alert) -> EventSinkResult<()> {
        self.alerts.publish(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let sink = InMemoryEventSink::default();
        let mut rx = sink.subscribe_snapshots();
        let snapshot = Snapshot::new(1);
        sink.publish_snapshot(&snapshot).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload.sequence, 1);
    }

    #[tokio::test]
    async fn subscriber_receives_published_alert() {
        use crate::domain::models::{AlertKind, Severity};

        let sink = InMemoryEventSink::default();
        let mut rx = sink.subscribe_alerts();
        let alert = Alert::new(AlertKind::QueueBacklog, Severity::Warning, "backlog");
        sink.publish_alert(&alert).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload.id, alert.id);
    }
}
