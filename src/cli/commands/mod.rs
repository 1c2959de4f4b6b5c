//! Command handlers, one module per inbound port (§6): orchestration,
//! resource, monitor, dependency, plus the long-running `run` loop.
//!
//! Every CLI invocation is a one-shot process except `run`: it loads
//! whatever `Repository` backend the caller selected, executes one
//! command, and exits. Stateful in-process services (`Orchestrator`
//! actors, `ResourceBroker`, `Scheduler`, `Monitor`) only live for the
//! duration of a single invocation — only what a `Repository` persists
//! survives between separate command calls.

pub mod dependency;
pub mod monitor;
pub mod orchestration;
pub mod resource;
pub mod run;

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::domain::models::{
    EdgeKind, EngineConfig, Orchestration, OrchestrationMode, OrchestrationStatus,
    OrchestrationType, Priority, ResourceType,
};
use crate::domain::ports::{OrchestrationFilter, Repository};

/// Shared handles every command needs: the active repository backend, the
/// loaded engine configuration, and the caller's requested output mode.
pub struct AppContext {
    pub repository: Arc<dyn Repository>,
    pub config: EngineConfig,
    pub json: bool,
}

impl AppContext {
    pub fn new(repository: Arc<dyn Repository>, config: EngineConfig, json: bool) -> Self {
        Self { repository, config, json }
    }
}

pub fn parse_orchestration_type(s: &str) -> Result<OrchestrationType> {
    Ok(match s.to_lowercase().as_str() {
        "discovery" => OrchestrationType::Discovery,
        "comprehensive" => OrchestrationType::Comprehensive,
        "quality" => OrchestrationType::Quality,
        "compliance" => OrchestrationType::Compliance,
        "classification" => OrchestrationType::Classification,
        "lineage" => OrchestrationType::Lineage,
        "incremental" => OrchestrationType::Incremental,
        "emergency" => OrchestrationType::Emergency,
        "maintenance" => OrchestrationType::Maintenance,
        "custom" => OrchestrationType::Custom,
        other => return Err(anyhow!("unknown orchestration type: {other}")),
    })
}

pub fn parse_mode(s: &str) -> Result<OrchestrationMode> {
    Ok(match s.to_lowercase().as_str() {
        "synchronous" => OrchestrationMode::Synchronous,
        "asynchronous" => OrchestrationMode::Asynchronous,
        "streaming" => OrchestrationMode::Streaming,
        "batch" => OrchestrationMode::Batch,
        "hybrid" => OrchestrationMode::Hybrid,
        "adaptive" => OrchestrationMode::Adaptive,
        other => return Err(anyhow!("unknown orchestration mode: {other}")),
    })
}

pub fn parse_priority(s: &str) -> Result<Priority> {
    Ok(match s.to_lowercase().as_str() {
        "background" => Priority::Background,
        "low" => Priority::Low,
        "medium" => Priority::Medium,
        "high" => Priority::High,
        "critical" => Priority::Critical,
        other => return Err(anyhow!("unknown priority: {other}")),
    })
}

pub fn parse_status(s: &str) -> Result<OrchestrationStatus> {
    Ok(match s.to_lowercase().as_str() {
        "initializing" => OrchestrationStatus::Initializing,
        "planning" => OrchestrationStatus::Planning,
        "pending_approval" => OrchestrationStatus::PendingApproval,
        "queued" => OrchestrationStatus::Queued,
        "running" => OrchestrationStatus::Running,
        "paused" => OrchestrationStatus::Paused,
        "completing" => OrchestrationStatus::Completing,
        "completed" => OrchestrationStatus::Completed,
        "failed" => OrchestrationStatus::Failed,
        "retrying" => OrchestrationStatus::Retrying,
        "cancelled" | "canceled" => OrchestrationStatus::Cancelled,
        "terminated" => OrchestrationStatus::Terminated,
        other => return Err(anyhow!("unknown orchestration status: {other}")),
    })
}

pub fn parse_resource_type(s: &str) -> Result<ResourceType> {
    Ok(match s.to_lowercase().as_str() {
        "cpu" => ResourceType::Cpu,
        "memory" => ResourceType::Memory,
        "network_bandwidth" | "network-bandwidth" | "networkbandwidth" => {
            ResourceType::NetworkBandwidth
        }
        "concurrent_connections" | "concurrent-connections" => {
            ResourceType::ConcurrentConnections
        }
        "storage_iops" | "storage-iops" => ResourceType::StorageIops,
        "workers" | "worker" => ResourceType::Workers,
        "api_calls" | "api-calls" => ResourceType::ApiCalls,
        "compute_instances" | "compute-instances" => ResourceType::ComputeInstances,
        "classifier_instances" | "classifier-instances" => ResourceType::ClassifierInstances,
        "ml_models" | "ml-models" => ResourceType::MlModels,
        "storage" => ResourceType::Storage,
        other => return Err(anyhow!("unknown resource type: {other}")),
    })
}

pub fn parse_edge_kind(s: &str) -> Result<EdgeKind> {
    Ok(match s.to_lowercase().as_str() {
        "prerequisite" => EdgeKind::Prerequisite,
        "blocking" => EdgeKind::Blocking,
        "conditional" => EdgeKind::Conditional,
        "parallel" => EdgeKind::Parallel,
        "sequential" => EdgeKind::Sequential,
        "optional" => EdgeKind::Optional,
        other => return Err(anyhow!("unknown edge kind: {other}")),
    })
}

/// Every resource type the broker may track a pool for (§3, §4.3).
pub const ALL_RESOURCE_TYPES: [ResourceType; 11] = [
    ResourceType::Cpu,
    ResourceType::Memory,
    ResourceType::NetworkBandwidth,
    ResourceType::ConcurrentConnections,
    ResourceType::StorageIops,
    ResourceType::Workers,
    ResourceType::ApiCalls,
    ResourceType::ComputeInstances,
    ResourceType::ClassifierInstances,
    ResourceType::MlModels,
    ResourceType::Storage,
];

/// Resolve a caller-supplied id string to an orchestration: a full UUID
/// matches directly, otherwise it is treated as an unambiguous prefix of
/// one (the short id shown in list/table output).
pub async fn resolve_orchestration(ctx: &AppContext, id: &str) -> Result<Orchestration> {
    if let Ok(uuid) = uuid::Uuid::parse_str(id) {
        return ctx
            .repository
            .get_orchestration(uuid)
            .await?
            .ok_or_else(|| anyhow!("orchestration not found: {id}"));
    }

    let candidates: Vec<Orchestration> = ctx
        .repository
        .list_orchestrations(OrchestrationFilter::default())
        .await?
        .into_iter()
        .filter(|o| o.id.to_string().starts_with(id))
        .collect();

    match candidates.len() {
        0 => Err(anyhow!("no orchestration matches id prefix: {id}")),
        1 => Ok(candidates.into_iter().next().expect("checked len == 1")),
        _ => Err(anyhow!("id prefix '{id}' is ambiguous, matches {} orchestrations", candidates.len())),
    }
}
