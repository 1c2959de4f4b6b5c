//! Application layer: orchestration lifecycle, scheduling, resource
//! brokering, and monitoring. Coordinates the domain and services layers
//! against the outbound ports, owning every stateful workflow in the core.

pub mod dependency_resolver;
pub mod monitor;
pub mod orchestrator;
pub mod resource_broker;
pub mod resource_monitor;
pub mod scheduler;
pub mod strategy_engine;

pub use dependency_resolver::DependencyResolver;
pub use monitor::{
    AnomalyDetector, LatencyZScoreDetector, Monitor, MonitorThresholds, NullAnomalyDetector,
    SampleInput, SubscriberFilter, DEFAULT_HISTORY_SIZE,
};
pub use orchestrator::{Orchestrator, OrchestratorCommand, OrchestratorHandle, ScanOperationRegistry};
pub use resource_broker::{PoolSnapshot, ResourceBroker};
pub use resource_monitor::{ResourceEvent, ResourceLimits, ResourceMonitor, ResourceStatus};
pub use scheduler::{QueuedStage, Scheduler};
pub use strategy_engine::StrategyEngine;
