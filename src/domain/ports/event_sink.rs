//! `EventSink` outbound port: delivery of Monitor snapshots and alerts to
//! external subscribers.

use async_trait::async_trait;

use crate::domain::error::EventSinkResult;
use crate::domain::models::{Alert, Snapshot};

/// Outbound port the Monitor publishes through. Best-effort: a slow or
/// failing sink never blocks the sampling loop, per §4.6's backlog-drop
/// semantics at the bus layer.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_snapshot(&self, snapshot: &Snapshot) -> EventSinkResult<()>;
    async fn publish_alert(&self, alert: &Alert) -> EventSinkResult<()>;
}
