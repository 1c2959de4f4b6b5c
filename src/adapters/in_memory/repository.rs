//! In-process `Repository` implementation backed by `RwLock`-guarded maps.
//!
//! Used by the CLI's `--no-db` demo mode and by integration tests that
//! don't need durability across process restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::{RepositoryError, RepositoryResult};
use crate::domain::models::{Alert, DependencyEdge, Orchestration, Reservation, Snapshot, Stage};
use crate::domain::ports::{OrchestrationFilter, Repository};

/// In-memory `Repository`. Every collection is a plain `HashMap` behind a
/// `RwLock`; no write is ever lost across the process's lifetime, but
/// nothing survives a restart.
#[derive(Default)]
pub struct InMemoryRepository {
    orchestrations: RwLock<HashMap<Uuid, Orchestration>>,
    stages: RwLock<HashMap<Uuid, Stage>>,
    dependency_edges: RwLock<HashMap<Uuid, DependencyEdge>>,
    reservations: RwLock<HashMap<Uuid, Reservation>>,
    snapshots: RwLock<Vec<Snapshot>>,
    alerts: RwLock<HashMap<Uuid, Alert>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_orchestration(&self, orchestration: &Orchestration) -> RepositoryResult<()> {
        self.orchestrations
            .write()
            .unwrap()
            .insert(orchestration.id, orchestration.clone());
        Ok(())
    }

    async fn get_orchestration(&self, id: Uuid) -> RepositoryResult<Option<Orchestration>> {
        Ok(self.orchestrations.read().unwrap().get(&id).cloned())
    }

    async fn update_orchestration(&self, orchestration: &Orchestration) -> RepositoryResult<()> {
        let mut guard = self.orchestrations.write().unwrap();
        if !guard.contains_key(&orchestration.id) {
            return Err(RepositoryError::NotFound {
                kind: "orchestration",
                id: orchestration.id,
            });
        }
        guard.insert(orchestration.id, orchestration.clone());
        Ok(())
    }

    async fn list_orchestrations(
        &self,
        filter: OrchestrationFilter,
    ) -> RepositoryResult<Vec<Orchestration>> {
        let guard = self.orchestrations.read().unwrap();
        Ok(guard
            .values()
            .filter(|o| filter.status.is_none_or(|s| s == o.status))
            .filter(|o| {
                filter
                    .name_contains
                    .as_ref()
                    .is_none_or(|needle| o.name.contains(needle.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn delete_orchestration(&self, id: Uuid) -> RepositoryResult<()> {
        self.orchestrations.write().unwrap().remove(&id);
        Ok(())
    }

    async fn create_stages(&self, stages: &[Stage]) -> RepositoryResult<()> {
        let mut guard = self.stages.write().unwrap();
        for stage in stages {
            guard.insert(stage.id, stage.clone());
        }
        Ok(())
    }

    async fn get_stage(&self, id: Uuid) -> RepositoryResult<Option<Stage>> {
        Ok(self.stages.read().unwrap().get(&id).cloned())
    }

    async fn update_stage(&self, stage: &Stage) -> RepositoryResult<()> {
        self.stages.write().unwrap().insert(stage.id, stage.clone());
        Ok(())
    }

    async fn list_stages_for_orchestration(
        &self,
        orchestration_id: Uuid,
    ) -> RepositoryResult<Vec<Stage>> {
        Ok(self
            .stages
            .read()
            .unwrap()
            .values()
            .filter(|s| s.orchestration_id == orchestration_id)
            .cloned()
            .collect())
    }

    async fn get_dependency_edge(&self, id: Uuid) -> RepositoryResult<Option<DependencyEdge>> {
        Ok(self.dependency_edges.read().unwrap().get(&id).cloned())
    }

    async fn create_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()> {
        self.dependency_edges.write().unwrap().insert(edge.id, edge.clone());
        Ok(())
    }

    async fn update_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()> {
        self.dependency_edges.write().unwrap().insert(edge.id, edge.clone());
        Ok(())
    }

    async fn delete_dependency_edge(&self, id: Uuid) -> RepositoryResult<()> {
        self.dependency_edges.write().unwrap().remove(&id);
        Ok(())
    }

    async fn list_dependency_edges_for(
        &self,
        orchestration_id: Uuid,
    ) -> RepositoryResult<Vec<DependencyEdge>> {
        Ok(self
            .dependency_edges
            .read()
            .unwrap()
            .values()
            .filter(|e| e.source == orchestration_id || e.dependent == orchestration_id)
            .cloned()
            .collect())
    }

    async fn create_reservation(&self, reservation: &Reservation) -> RepositoryResult<()> {
        self.reservations
            .write()
            .unwrap()
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn delete_reservation(&self, id: Uuid) -> RepositoryResult<()> {
        self.reservations.write().unwrap().remove(&id);
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> RepositoryResult<Option<Reservation>> {
        Ok(self.reservations.read().unwrap().get(&id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        self.snapshots.write().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn list_recent_snapshots(&self, limit: usize) -> RepositoryResult<Vec<Snapshot>> {
        let guard = self.snapshots.read().unwrap();
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }

    async fn save_alert(&self, alert: &Alert) -> RepositoryResult<()> {
        self.alerts.write().unwrap().insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> RepositoryResult<()> {
        self.alerts.write().unwrap().insert(alert.id, alert.clone());
        Ok(())
    }

    async fn list_open_alerts(&self) -> RepositoryResult<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .unwrap()
            .values()
            .filter(|a| a.is_open())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Alert, AlertKind, OrchestrationStatus, OrchestrationType, Severity};

    #[tokio::test]
    async fn round_trips_an_orchestration() {
        let repo = InMemoryRepository::new();
        let o = Orchestration::new("discover-lake", OrchestrationType::Discovery);
        repo.create_orchestration(&o).await.unwrap();
        let fetched = repo.get_orchestration(o.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "discover-lake");
    }

    #[tokio::test]
    async fn update_missing_orchestration_errors() {
        let repo = InMemoryRepository::new();
        let o = Orchestration::new("ghost", OrchestrationType::Discovery);
        assert!(repo.update_orchestration(&o).await.is_err());
    }

    #[tokio::test]
    async fn list_orchestrations_filters_by_status() {
        let repo = InMemoryRepository::new();
        let mut running = Orchestration::new("a", OrchestrationType::Discovery);
        running.status = OrchestrationStatus::Running;
        let queued = Orchestration::new("b", OrchestrationType::Discovery);
        repo.create_orchestration(&running).await.unwrap();
        repo.create_orchestration(&queued).await.unwrap();

        let filtered = repo
            .list_orchestrations(OrchestrationFilter {
                status: Some(OrchestrationStatus::Running),
                name_contains: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn list_open_alerts_excludes_resolved() {
        let repo = InMemoryRepository::new();
        let mut alert = Alert::new(AlertKind::QueueBacklog, Severity::Warning, "backlog growing");
        repo.save_alert(&alert).await.unwrap();
        assert_eq!(repo.list_open_alerts().await.unwrap().len(), 1);

        alert.resolve("oncall", "backlog drained");
        repo.update_alert(&alert).await.unwrap();
        assert!(repo.list_open_alerts().await.unwrap().is_empty());
    }
}
