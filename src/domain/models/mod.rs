//! Domain models.
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod alert;
pub mod config;
pub mod dag;
pub mod dependency_edge;
pub mod orchestration;
pub mod resource;
pub mod snapshot;
pub mod stage;
pub mod strategy;

pub use alert::{Alert, AlertKind, Severity};
pub use config::{DatabaseConfig, EngineConfig, LoggingConfig, PoolDefaultsConfig, RetryConfig};
pub use dag::{DagError, DagStats, StageDag};
pub use dependency_edge::{DependencyEdge, EdgeKind, EdgeStatus};
pub use orchestration::{
    Budget, Orchestration, OrchestrationMode, OrchestrationStatus, OrchestrationType, Priority,
    Progress, RetryState, TargetRef,
};
pub use resource::{PoolHealth, Reservation, ResourcePool, ResourceType, ScalePolicy};
pub use snapshot::{Snapshot, SnapshotHealth};
pub use stage::{RetryPolicy, Stage, StageFailureKind, StageOutcome, StageStatus};
pub use strategy::{select_best, ScoringWeights, StrategyClass, StrategyPlan};
