//! `EventSink` adapter that persists Monitor output through the
//! `Repository` port instead of an in-memory bus, so `monitor history`
//! can read back snapshots raised by an earlier `run` invocation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::EventSinkResult;
use crate::domain::models::{Alert, Snapshot};
use crate::domain::ports::{EventSink, Repository};

/// Wraps any `Repository` as an `EventSink`, so the Monitor can be given
/// durable storage without depending on the repository port directly.
pub struct RepositoryEventSink {
    repository: Arc<dyn Repository>,
}

impl RepositoryEventSink {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl EventSink for RepositoryEventSink {
    async fn publish_snapshot(&self, snapshot: &Snapshot) -> EventSinkResult<()> {
        self.repository
            .save_snapshot(snapshot)
            .await
            .map_err(|e| crate::domain::error::EventSinkError::SnapshotDeliveryFailed(e.to_string()))
    }

    async fn publish_alert(&self, alert: &Alert) -> EventSinkResult<()> {
        self.repository
            .save_alert(alert)
            .await
            .map_err(|e| crate::domain::error::EventSinkError::AlertDeliveryFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryRepository;
    use crate::domain::models::{AlertKind, Severity};

    #[tokio::test]
    async fn publish_snapshot_persists_through_repository() {
        let repo = Arc::new(InMemoryRepository::new());
        let sink = RepositoryEventSink::new(repo.clone());
        let snapshot = Snapshot::new(1);

        sink.publish_snapshot(&snapshot).await.unwrap();
        let recent = repo.list_recent_snapshots(1).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn publish_alert_persists_through_repository() {
        let repo = Arc::new(InMemoryRepository::new());
        let sink = RepositoryEventSink::new(repo.clone());
        let alert = Alert::new(AlertKind::QueueBacklog, Severity::Warning, "backlog");

        sink.publish_alert(&alert).await.unwrap();
        let open = repo.list_open_alerts().await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
