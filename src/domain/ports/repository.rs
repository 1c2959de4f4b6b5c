//! Repository outbound port: persistence for every entity the core owns.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::RepositoryResult;
use crate::domain::models::{
    Alert, DependencyEdge, Orchestration, OrchestrationStatus, Reservation, Snapshot, Stage,
};

/// Filter criteria for listing orchestrations.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationFilter {
    pub status: Option<OrchestrationStatus>,
    pub name_contains: Option<String>,
}

/// Outbound persistence port. One trait covering every persisted entity,
/// mirroring the teacher's per-entity repository shape collapsed into a
/// single port since the core has no need to swap entities independently.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_orchestration(&self, orchestration: &Orchestration) -> RepositoryResult<()>;
    async fn get_orchestration(&self, id: Uuid) -> RepositoryResult<Option<Orchestration>>;
    async fn update_orchestration(&self, orchestration: &Orchestration) -> RepositoryResult<()>;
    async fn list_orchestrations(
        &self,
        filter: OrchestrationFilter,
    ) -> RepositoryResult<Vec<Orchestration>>;
    async fn delete_orchestration(&self, id: Uuid) -> RepositoryResult<()>;

    async fn create_stages(&self, stages: &[Stage]) -> RepositoryResult<()>;
    async fn get_stage(&self, id: Uuid) -> RepositoryResult<Option<Stage>>;
    async fn update_stage(&self, stage: &Stage) -> RepositoryResult<()>;
    async fn list_stages_for_orchestration(
        &self,
        orchestration_id: Uuid,
    ) -> RepositoryResult<Vec<Stage>>;

    async fn create_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()>;
    async fn get_dependency_edge(&self, id: Uuid) -> RepositoryResult<Option<DependencyEdge>>;
    async fn update_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()>;
    async fn delete_dependency_edge(&self, id: Uuid) -> RepositoryResult<()>;
    async fn list_dependency_edges_for(&self, orchestration_id: Uuid) -> RepositoryResult<Vec<DependencyEdge>>;

    async fn create_reservation(&self, reservation: &Reservation) -> RepositoryResult<()>;
    async fn delete_reservation(&self, id: Uuid) -> RepositoryResult<()>;
    async fn get_reservation(&self, id: Uuid) -> RepositoryResult<Option<Reservation>>;

    async fn save_snapshot(&self, snapshot: &Snapshot) -> RepositoryResult<()>;
    async fn list_recent_snapshots(&self, limit: usize) -> RepositoryResult<Vec<Snapshot>>;

    async fn save_alert(&self, alert: &Alert) -> RepositoryResult<()>;
    async fn update_alert(&self, alert: &Alert) -> RepositoryResult<()>;
    async fn list_open_alerts(&self) -> RepositoryResult<Vec<Alert>>;
}
