//! SQLite implementation of the `Repository` port.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::error::{RepositoryError, RepositoryResult};
use crate::domain::models::{
    Alert, AlertKind, Budget, DependencyEdge, EdgeKind, EdgeStatus, Orchestration,
    OrchestrationMode, OrchestrationStatus, OrchestrationType, Priority, Progress, Reservation,
    ResourceType, RetryPolicy, RetryState, Severity, Snapshot, SnapshotHealth, Stage,
    StageFailureKind, StageOutcome, StageStatus, TargetRef,
};
use crate::domain::ports::OrchestrationFilter;

use super::{parse_datetime, parse_optional_uuid, parse_uuid};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn json_str<T: serde::Serialize>(value: &T) -> RepositoryResult<String> {
    serde_json::to_string(value).map_err(RepositoryError::Serialization)
}

fn parse_enum<T: Copy>(field: &'static str, s: &str, variants: &[(&str, T)]) -> RepositoryResult<T> {
    variants
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, v)| *v)
        .ok_or_else(|| RepositoryError::QueryFailed(format!("unknown {field} value: {s}")))
}

fn mode_str(mode: OrchestrationMode) -> &'static str {
    match mode {
        OrchestrationMode::Synchronous => "synchronous",
        OrchestrationMode::Asynchronous => "asynchronous",
        OrchestrationMode::Streaming => "streaming",
        OrchestrationMode::Batch => "batch",
        OrchestrationMode::Hybrid => "hybrid",
        OrchestrationMode::Adaptive => "adaptive",
    }
}

fn edge_kind_str(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Prerequisite => "prerequisite",
        EdgeKind::Blocking => "blocking",
        EdgeKind::Conditional => "conditional",
        EdgeKind::Parallel => "parallel",
        EdgeKind::Sequential => "sequential",
        EdgeKind::Optional => "optional",
    }
}

fn edge_status_str(status: EdgeStatus) -> &'static str {
    match status {
        EdgeStatus::Waiting => "waiting",
        EdgeStatus::Satisfied => "satisfied",
        EdgeStatus::Overridden => "overridden",
        EdgeStatus::TimedOut => "timed_out",
    }
}

const RESOURCE_TYPE_TABLE: &[(&str, ResourceType)] = &[
    ("cpu", ResourceType::Cpu),
    ("memory", ResourceType::Memory),
    ("network_bandwidth", ResourceType::NetworkBandwidth),
    ("concurrent_connections", ResourceType::ConcurrentConnections),
    ("storage_iops", ResourceType::StorageIops),
    ("workers", ResourceType::Workers),
    ("api_calls", ResourceType::ApiCalls),
    ("compute_instances", ResourceType::ComputeInstances),
    ("classifier_instances", ResourceType::ClassifierInstances),
    ("ml_models", ResourceType::MlModels),
    ("storage", ResourceType::Storage),
];

fn resource_type_str(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Cpu => "cpu",
        ResourceType::Memory => "memory",
        ResourceType::NetworkBandwidth => "network_bandwidth",
        ResourceType::ConcurrentConnections => "concurrent_connections",
        ResourceType::StorageIops => "storage_iops",
        ResourceType::Workers => "workers",
        ResourceType::ApiCalls => "api_calls",
        ResourceType::ComputeInstances => "compute_instances",
        ResourceType::ClassifierInstances => "classifier_instances",
        ResourceType::MlModels => "ml_models",
        ResourceType::Storage => "storage",
    }
}

fn alert_kind_str(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::PerformanceDegradation => "performance_degradation",
        AlertKind::ResourceExhaustion => "resource_exhaustion",
        AlertKind::ScanFailure => "scan_failure",
        AlertKind::Timeout => "timeout",
        AlertKind::Anomaly => "anomaly",
        AlertKind::Overload => "overload",
        AlertKind::PoolSaturation => "pool_saturation",
        AlertKind::HighFailureRate => "high_failure_rate",
        AlertKind::DeadlineAtRisk => "deadline_at_risk",
        AlertKind::BudgetAtRisk => "budget_at_risk",
        AlertKind::QueueBacklog => "queue_backlog",
    }
}

const ALERT_KIND_TABLE: &[(&str, AlertKind)] = &[
    ("performance_degradation", AlertKind::PerformanceDegradation),
    ("resource_exhaustion", AlertKind::ResourceExhaustion),
    ("scan_failure", AlertKind::ScanFailure),
    ("timeout", AlertKind::Timeout),
    ("anomaly", AlertKind::Anomaly),
    ("overload", AlertKind::Overload),
    ("pool_saturation", AlertKind::PoolSaturation),
    ("high_failure_rate", AlertKind::HighFailureRate),
    ("deadline_at_risk", AlertKind::DeadlineAtRisk),
    ("budget_at_risk", AlertKind::BudgetAtRisk),
    ("queue_backlog", AlertKind::QueueBacklog),
];

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

#[derive(FromRow)]
struct OrchestrationRow {
    id: String,
    name: String,
    orchestration_type: String,
    mode: String,
    priority: String,
    status: String,
    scheduled_start: Option<String>,
    actual_start: Option<String>,
    deadline: Option<String>,
    completion: Option<String>,
    max_runtime_secs: Option<i64>,
    budget_limit: Option<f64>,
    estimated_cost: f64,
    actual_cost: f64,
    targets: String,
    stages_done: i64,
    stages_total: i64,
    tasks_done: i64,
    tasks_total: i64,
    retry_count: i64,
    max_retries: i64,
    retry_backoff_base_ms: i64,
    resource_reservation_id: Option<String>,
    required_approvals: String,
    created_at: String,
    status_since: String,
    last_error: Option<String>,
}

impl TryFrom<OrchestrationRow> for Orchestration {
    type Error = RepositoryError;

    fn try_from(row: OrchestrationRow) -> Result<Self, Self::Error> {
        Ok(Orchestration {
            id: parse_uuid(&row.id)?,
            name: row.name,
            orchestration_type: parse_enum(
                "orchestration_type",
                &row.orchestration_type,
                &[
                    ("discovery", OrchestrationType::Discovery),
                    ("comprehensive", OrchestrationType::Comprehensive),
                    ("quality", OrchestrationType::Quality),
                    ("compliance", OrchestrationType::Compliance),
                    ("classification", OrchestrationType::Classification),
                    ("lineage", OrchestrationType::Lineage),
                    ("incremental", OrchestrationType::Incremental),
                    ("emergency", OrchestrationType::Emergency),
                    ("maintenance", OrchestrationType::Maintenance),
                    ("custom", OrchestrationType::Custom),
                ],
            )?,
            mode: parse_enum(
                "mode",
                &row.mode,
                &[
                    ("synchronous", OrchestrationMode::Synchronous),
                    ("asynchronous", OrchestrationMode::Asynchronous),
                    ("streaming", OrchestrationMode::Streaming),
                    ("batch", OrchestrationMode::Batch),
                    ("hybrid", OrchestrationMode::Hybrid),
                    ("adaptive", OrchestrationMode::Adaptive),
                ],
            )?,
            priority: parse_enum(
                "priority",
                &row.priority,
                &[
                    ("background", Priority::Background),
                    ("low", Priority::Low),
                    ("medium", Priority::Medium),
                    ("high", Priority::High),
                    ("critical", Priority::Critical),
                ],
            )?,
            status: parse_enum(
                "status",
                &row.status,
                &[
                    ("initializing", OrchestrationStatus::Initializing),
                    ("planning", OrchestrationStatus::Planning),
                    ("pending_approval", OrchestrationStatus::PendingApproval),
                    ("queued", OrchestrationStatus::Queued),
                    ("running", OrchestrationStatus::Running),
                    ("paused", OrchestrationStatus::Paused),
                    ("completing", OrchestrationStatus::Completing),
                    ("completed", OrchestrationStatus::Completed),
                    ("failed", OrchestrationStatus::Failed),
                    ("retrying", OrchestrationStatus::Retrying),
                    ("cancelled", OrchestrationStatus::Cancelled),
                    ("terminated", OrchestrationStatus::Terminated),
                ],
            )?,
            scheduled_start: row.scheduled_start.map(|s| parse_datetime(&s)).transpose()?,
            actual_start: row.actual_start.map(|s| parse_datetime(&s)).transpose()?,
            deadline: row.deadline.map(|s| parse_datetime(&s)).transpose()?,
            completion: row.completion.map(|s| parse_datetime(&s)).transpose()?,
            max_runtime_secs: row.max_runtime_secs.map(|v| v as u64),
            budget: Budget {
                limit: row.budget_limit,
                estimated_cost: row.estimated_cost,
                actual_cost: row.actual_cost,
            },
            targets: serde_json::from_str::<Vec<TargetRef>>(&row.targets)
                .map_err(RepositoryError::Serialization)?
                .into_iter()
                .collect::<HashSet<_>>(),
            progress: Progress {
                stages_done: row.stages_done as u32,
                stages_total: row.stages_total as u32,
                tasks_done: row.tasks_done as u32,
                tasks_total: row.tasks_total as u32,
            },
            retry: RetryState {
                retry_count: row.retry_count as u32,
                max_retries: row.max_retries as u32,
            },
            retry_backoff_base_ms: row.retry_backoff_base_ms as u64,
            resource_reservation_id: parse_optional_uuid(row.resource_reservation_id)?,
            required_approvals: serde_json::from_str(&row.required_approvals)
                .map_err(RepositoryError::Serialization)?,
            created_at: parse_datetime(&row.created_at)?,
            status_since: parse_datetime(&row.status_since)?,
            last_error: row.last_error,
        })
    }
}

#[derive(FromRow)]
struct StageRow {
    id: String,
    orchestration_id: String,
    name: String,
    operation: String,
    depends_on: String,
    status: String,
    retry_max_attempts: i64,
    retry_backoff_base_ms: i64,
    retry_backoff_cap_ms: i64,
    retry_jitter_max_ms: i64,
    attempt: i64,
    priority_hint: i64,
    estimated_cost: f64,
    started_at: Option<String>,
    last_outcome_failure_kind: Option<String>,
    last_outcome_message: Option<String>,
    last_outcome_attempt: Option<i64>,
    last_outcome_finished_at: Option<String>,
}

impl TryFrom<StageRow> for Stage {
    type Error = RepositoryError;

    fn try_from(row: StageRow) -> Result<Self, Self::Error> {
        let depends_on: Vec<String> =
            serde_json::from_str(&row.depends_on).map_err(RepositoryError::Serialization)?;
        let depends_on = depends_on
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<RepositoryResult<Vec<_>>>()?;

        let last_outcome = match row.last_outcome_finished_at {
            Some(finished_at) => Some(StageOutcome {
                failure_kind: row
                    .last_outcome_failure_kind
                    .map(|k| match k.as_str() {
                        "retryable" => Ok(StageFailureKind::Retryable),
                        "fatal" => Ok(StageFailureKind::Fatal),
                        other => Err(RepositoryError::QueryFailed(format!(
                            "unknown stage failure kind: {other}"
                        ))),
                    })
                    .transpose()?,
                message: row.last_outcome_message,
                attempt: row.last_outcome_attempt.unwrap_or(0) as u32,
                finished_at: parse_datetime(&finished_at)?,
            }),
            None => None,
        };

        Ok(Stage {
            id: parse_uuid(&row.id)?,
            orchestration_id: parse_uuid(&row.orchestration_id)?,
            name: row.name,
            operation: row.operation,
            depends_on,
            status: StageStatus::from_str(&row.status).ok_or_else(|| {
                RepositoryError::QueryFailed(format!("unknown stage status: {}", row.status))
            })?,
            retry_policy: RetryPolicy {
                max_attempts: row.retry_max_attempts as u32,
                backoff_base_ms: row.retry_backoff_base_ms as u64,
                backoff_cap_ms: row.retry_backoff_cap_ms as u64,
                jitter_max_ms: row.retry_jitter_max_ms as u64,
            },
            attempt: row.attempt as u32,
            priority_hint: row.priority_hint,
            estimated_cost: row.estimated_cost,
            started_at: row.started_at.map(|s| parse_datetime(&s)).transpose()?,
            last_outcome,
        })
    }
}

#[derive(FromRow)]
struct DependencyEdgeRow {
    id: String,
    source: String,
    dependent: String,
    kind: String,
    status: String,
    wait_timeout_ms: Option<i64>,
    created_at: String,
    overridden_by: Option<String>,
}

impl TryFrom<DependencyEdgeRow> for DependencyEdge {
    type Error = RepositoryError;

    fn try_from(row: DependencyEdgeRow) -> Result<Self, Self::Error> {
        Ok(DependencyEdge {
            id: parse_uuid(&row.id)?,
            source: parse_uuid(&row.source)?,
            dependent: parse_uuid(&row.dependent)?,
            kind: parse_enum(
                "edge kind",
                &row.kind,
                &[
                    ("prerequisite", EdgeKind::Prerequisite),
                    ("blocking", EdgeKind::Blocking),
                    ("conditional", EdgeKind::Conditional),
                    ("parallel", EdgeKind::Parallel),
                    ("sequential", EdgeKind::Sequential),
                    ("optional", EdgeKind::Optional),
                ],
            )?,
            status: parse_enum(
                "edge status",
                &row.status,
                &[
                    ("waiting", EdgeStatus::Waiting),
                    ("satisfied", EdgeStatus::Satisfied),
                    ("overridden", EdgeStatus::Overridden),
                    ("timed_out", EdgeStatus::TimedOut),
                ],
            )?,
            wait_timeout_ms: row.wait_timeout_ms.map(|v| v as u64),
            created_at: parse_datetime(&row.created_at)?,
            overridden_by: row.overridden_by,
        })
    }
}

#[derive(FromRow)]
struct ReservationRow {
    id: String,
    orchestration_id: String,
    entries: String,
    created_at: String,
    preempted: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = RepositoryError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let entries: HashMap<String, f64> =
            serde_json::from_str(&row.entries).map_err(RepositoryError::Serialization)?;
        let entries = entries
            .into_iter()
            .map(|(k, v)| {
                let resource_type = parse_enum("resource type", &k, RESOURCE_TYPE_TABLE)?;
                Ok((resource_type, v))
            })
            .collect::<RepositoryResult<HashMap<_, _>>>()?;

        Ok(Reservation {
            id: parse_uuid(&row.id)?,
            orchestration_id: parse_uuid(&row.orchestration_id)?,
            entries,
            created_at: parse_datetime(&row.created_at)?,
            preempted: row.preempted != 0,
        })
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    id: String,
    sequence: i64,
    taken_at: String,
    orchestration_id: Option<String>,
    cpu_percent: f64,
    memory_percent: f64,
    disk_io_percent: f64,
    network_io_percent: f64,
    throughput: f64,
    latency_ms: f64,
    error_rate: f64,
    success_rate: f64,
    sla_percent: f64,
    cost: f64,
    active_orchestrations: i64,
    queued_orchestrations: i64,
    completed_count: i64,
    failed_count: i64,
    pool_utilization: String,
    stages_completed_since_last: i64,
    stages_failed_since_last: i64,
    health: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = RepositoryError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let pool_utilization: HashMap<String, f64> =
            serde_json::from_str(&row.pool_utilization).map_err(RepositoryError::Serialization)?;
        let pool_utilization = pool_utilization
            .into_iter()
            .map(|(k, v)| {
                let resource_type = parse_enum("resource type", &k, RESOURCE_TYPE_TABLE)?;
                Ok((resource_type, v))
            })
            .collect::<RepositoryResult<HashMap<_, _>>>()?;

        Ok(Snapshot {
            id: parse_uuid(&row.id)?,
            sequence: row.sequence as u64,
            taken_at: parse_datetime(&row.taken_at)?,
            orchestration_id: parse_optional_uuid(row.orchestration_id)?,
            cpu_percent: row.cpu_percent,
            memory_percent: row.memory_percent,
            disk_io_percent: row.disk_io_percent,
            network_io_percent: row.network_io_percent,
            throughput: row.throughput,
            latency_ms: row.latency_ms,
            error_rate: row.error_rate,
            success_rate: row.success_rate,
            sla_percent: row.sla_percent,
            cost: row.cost,
            active_orchestrations: row.active_orchestrations as u32,
            queued_orchestrations: row.queued_orchestrations as u32,
            completed_count: row.completed_count as u32,
            failed_count: row.failed_count as u32,
            pool_utilization,
            stages_completed_since_last: row.stages_completed_since_last as u32,
            stages_failed_since_last: row.stages_failed_since_last as u32,
            health: parse_enum(
                "snapshot health",
                &row.health,
                &[
                    ("healthy", SnapshotHealth::Healthy),
                    ("degraded", SnapshotHealth::Degraded),
                    ("unhealthy", SnapshotHealth::Unhealthy),
                ],
            )?,
        })
    }
}

#[derive(FromRow)]
struct AlertRow {
    id: String,
    kind: String,
    severity: String,
    message: String,
    raised_at: String,
    acknowledged: i64,
    acknowledged_by: Option<String>,
    resolved_at: Option<String>,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
    related_orchestration: Option<String>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = RepositoryError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: parse_uuid(&row.id)?,
            kind: parse_enum("alert kind", &row.kind, ALERT_KIND_TABLE)?,
            severity: parse_enum(
                "severity",
                &row.severity,
                &[
                    ("info", Severity::Info),
                    ("warning", Severity::Warning),
                    ("critical", Severity::Critical),
                ],
            )?,
            message: row.message,
            raised_at: parse_datetime(&row.raised_at)?,
            acknowledged: row.acknowledged != 0,
            acknowledged_by: row.acknowledged_by,
            resolved_at: row.resolved_at.map(|s| parse_datetime(&s)).transpose()?,
            resolved_by: row.resolved_by,
            resolution_note: row.resolution_note,
            related_orchestration: parse_optional_uuid(row.related_orchestration)?,
        })
    }
}

#[async_trait]
impl crate::domain::ports::Repository for SqliteRepository {
    async fn create_orchestration(&self, o: &Orchestration) -> RepositoryResult<()> {
        let targets: Vec<&TargetRef> = o.targets.iter().collect();
        sqlx::query(
            r"INSERT INTO orchestrations (
                id, name, orchestration_type, mode, priority, status,
                scheduled_start, actual_start, deadline, completion, max_runtime_secs,
                budget_limit, estimated_cost, actual_cost, targets,
                stages_done, stages_total, tasks_done, tasks_total,
                retry_count, max_retries, retry_backoff_base_ms,
                resource_reservation_id, required_approvals, created_at, status_since, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(o.id.to_string())
        .bind(&o.name)
        .bind(o.orchestration_type.as_str())
        .bind(mode_str(o.mode))
        .bind(o.priority.as_str())
        .bind(o.status.as_str())
        .bind(o.scheduled_start.map(|t| t.to_rfc3339()))
        .bind(o.actual_start.map(|t| t.to_rfc3339()))
        .bind(o.deadline.map(|t| t.to_rfc3339()))
        .bind(o.completion.map(|t| t.to_rfc3339()))
        .bind(o.max_runtime_secs.map(|v| v as i64))
        .bind(o.budget.limit)
        .bind(o.budget.estimated_cost)
        .bind(o.budget.actual_cost)
        .bind(json_str(&targets)?)
        .bind(i64::from(o.progress.stages_done))
        .bind(i64::from(o.progress.stages_total))
        .bind(i64::from(o.progress.tasks_done))
        .bind(i64::from(o.progress.tasks_total))
        .bind(i64::from(o.retry.retry_count))
        .bind(i64::from(o.retry.max_retries))
        .bind(o.retry_backoff_base_ms as i64)
        .bind(o.resource_reservation_id.map(|id| id.to_string()))
        .bind(json_str(&o.required_approvals)?)
        .bind(o.created_at.to_rfc3339())
        .bind(o.status_since.to_rfc3339())
        .bind(&o.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_orchestration(&self, id: Uuid) -> RepositoryResult<Option<Orchestration>> {
        let row: Option<OrchestrationRow> = sqlx::query_as("SELECT * FROM orchestrations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Orchestration::try_from).transpose()
    }

    async fn update_orchestration(&self, o: &Orchestration) -> RepositoryResult<()> {
        let targets: Vec<&TargetRef> = o.targets.iter().collect();
        sqlx::query(
            r"UPDATE orchestrations SET
                name = ?, orchestration_type = ?, mode = ?, priority = ?, status = ?,
                scheduled_start = ?, actual_start = ?, deadline = ?, completion = ?, max_runtime_secs = ?,
                budget_limit = ?, estimated_cost = ?, actual_cost = ?, targets = ?,
                stages_done = ?, stages_total = ?, tasks_done = ?, tasks_total = ?,
                retry_count = ?, max_retries = ?, retry_backoff_base_ms = ?,
                resource_reservation_id = ?, required_approvals = ?, status_since = ?, last_error = ?
            WHERE id = ?",
        )
        .bind(&o.name)
        .bind(o.orchestration_type.as_str())
        .bind(mode_str(o.mode))
        .bind(o.priority.as_str())
        .bind(o.status.as_str())
        .bind(o.scheduled_start.map(|t| t.to_rfc3339()))
        .bind(o.actual_start.map(|t| t.to_rfc3339()))
        .bind(o.deadline.map(|t| t.to_rfc3339()))
        .bind(o.completion.map(|t| t.to_rfc3339()))
        .bind(o.max_runtime_secs.map(|v| v as i64))
        .bind(o.budget.limit)
        .bind(o.budget.estimated_cost)
        .bind(o.budget.actual_cost)
        .bind(json_str(&targets)?)
        .bind(i64::from(o.progress.stages_done))
        .bind(i64::from(o.progress.stages_total))
        .bind(i64::from(o.progress.tasks_done))
        .bind(i64::from(o.progress.tasks_total))
        .bind(i64::from(o.retry.retry_count))
        .bind(i64::from(o.retry.max_retries))
        .bind(o.retry_backoff_base_ms as i64)
        .bind(o.resource_reservation_id.map(|id| id.to_string()))
        .bind(json_str(&o.required_approvals)?)
        .bind(o.status_since.to_rfc3339())
        .bind(&o.last_error)
        .bind(o.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_orchestrations(
        &self,
        filter: OrchestrationFilter,
    ) -> RepositoryResult<Vec<Orchestration>> {
        let rows: Vec<OrchestrationRow> = sqlx::query_as("SELECT * FROM orchestrations ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(Orchestration::try_from)
            .collect::<RepositoryResult<Vec<_>>>()
            .map(|all| {
                all.into_iter()
                    .filter(|o| filter.status.is_none_or(|s| s == o.status))
                    .filter(|o| {
                        filter
                            .name_contains
                            .as_ref()
                            .is_none_or(|needle| o.name.contains(needle.as_str()))
                    })
                    .collect()
            })
    }

    async fn delete_orchestration(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM orchestrations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_stages(&self, stages: &[Stage]) -> RepositoryResult<()> {
        for stage in stages {
            let depends_on: Vec<String> = stage.depends_on.iter().map(Uuid::to_string).collect();
            sqlx::query(
                r"INSERT INTO stages (
                    id, orchestration_id, name, operation, depends_on, status,
                    retry_max_attempts, retry_backoff_base_ms, retry_backoff_cap_ms, retry_jitter_max_ms,
                    attempt, priority_hint, estimated_cost, started_at,
                    last_outcome_failure_kind, last_outcome_message, last_outcome_attempt, last_outcome_finished_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(stage.id.to_string())
            .bind(stage.orchestration_id.to_string())
            .bind(&stage.name)
            .bind(&stage.operation)
            .bind(json_str(&depends_on)?)
            .bind(stage.status.as_str())
            .bind(i64::from(stage.retry_policy.max_attempts))
            .bind(stage.retry_policy.backoff_base_ms as i64)
            .bind(stage.retry_policy.backoff_cap_ms as i64)
            .bind(stage.retry_policy.jitter_max_ms as i64)
            .bind(i64::from(stage.attempt))
            .bind(stage.priority_hint)
            .bind(stage.estimated_cost)
            .bind(stage.started_at.map(|t| t.to_rfc3339()))
            .bind(stage.last_outcome.as_ref().and_then(|o| o.failure_kind).map(|k| match k {
                StageFailureKind::Retryable => "retryable",
                StageFailureKind::Fatal => "fatal",
            }))
            .bind(stage.last_outcome.as_ref().and_then(|o| o.message.clone()))
            .bind(stage.last_outcome.as_ref().map(|o| i64::from(o.attempt)))
            .bind(stage.last_outcome.as_ref().map(|o| o.finished_at.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_stage(&self, id: Uuid) -> RepositoryResult<Option<Stage>> {
        let row: Option<StageRow> = sqlx::query_as("SELECT * FROM stages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Stage::try_from).transpose()
    }

    async fn update_stage(&self, stage: &Stage) -> RepositoryResult<()> {
        sqlx::query(
            r"UPDATE stages SET
                status = ?, attempt = ?, started_at = ?,
                last_outcome_failure_kind = ?, last_outcome_message = ?,
                last_outcome_attempt = ?, last_outcome_finished_at = ?
            WHERE id = ?",
        )
        .bind(stage.status.as_str())
        .bind(i64::from(stage.attempt))
        .bind(stage.started_at.map(|t| t.to_rfc3339()))
        .bind(stage.last_outcome.as_ref().and_then(|o| o.failure_kind).map(|k| match k {
            StageFailureKind::Retryable => "retryable",
            StageFailureKind::Fatal => "fatal",
        }))
        .bind(stage.last_outcome.as_ref().and_then(|o| o.message.clone()))
        .bind(stage.last_outcome.as_ref().map(|o| i64::from(o.attempt)))
        .bind(stage.last_outcome.as_ref().map(|o| o.finished_at.to_rfc3339()))
        .bind(stage.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_stages_for_orchestration(
        &self,
        orchestration_id: Uuid,
    ) -> RepositoryResult<Vec<Stage>> {
        let rows: Vec<StageRow> =
            sqlx::query_as("SELECT * FROM stages WHERE orchestration_id = ?")
                .bind(orchestration_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Stage::try_from).collect()
    }

    async fn get_dependency_edge(&self, id: Uuid) -> RepositoryResult<Option<DependencyEdge>> {
        let row: Option<DependencyEdgeRow> =
            sqlx::query_as("SELECT * FROM dependency_edges WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(DependencyEdge::try_from).transpose()
    }

    async fn create_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()> {
        sqlx::query(
            r"INSERT INTO dependency_edges (
                id, source, dependent, kind, status, wait_timeout_ms, created_at, overridden_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(edge.id.to_string())
        .bind(edge.source.to_string())
        .bind(edge.dependent.to_string())
        .bind(edge_kind_str(edge.kind))
        .bind(edge_status_str(edge.status))
        .bind(edge.wait_timeout_ms.map(|v| v as i64))
        .bind(edge.created_at.to_rfc3339())
        .bind(&edge.overridden_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_dependency_edge(&self, edge: &DependencyEdge) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE dependency_edges SET status = ?, overridden_by = ? WHERE id = ?",
        )
        .bind(edge_status_str(edge.status))
        .bind(&edge.overridden_by)
        .bind(edge.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_dependency_edge(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM dependency_edges WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_dependency_edges_for(&self, orchestration_id: Uuid) -> RepositoryResult<Vec<DependencyEdge>> {
        let rows: Vec<DependencyEdgeRow> = sqlx::query_as(
            "SELECT * FROM dependency_edges WHERE source = ? OR dependent = ?",
        )
        .bind(orchestration_id.to_string())
        .bind(orchestration_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DependencyEdge::try_from).collect()
    }

    async fn create_reservation(&self, reservation: &Reservation) -> RepositoryResult<()> {
        let entries: HashMap<String, f64> = reservation
            .entries
            .iter()
            .map(|(k, v)| (resource_type_str(*k).to_string(), *v))
            .collect();
        sqlx::query(
            "INSERT INTO reservations (id, orchestration_id, entries, created_at, preempted) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(reservation.id.to_string())
        .bind(reservation.orchestration_id.to_string())
        .bind(json_str(&entries)?)
        .bind(reservation.created_at.to_rfc3339())
        .bind(i64::from(reservation.preempted))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_reservation(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM reservations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> RepositoryResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as("SELECT * FROM reservations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        let pool_utilization: HashMap<String, f64> = snapshot
            .pool_utilization
            .iter()
            .map(|(k, v)| (resource_type_str(*k).to_string(), *v))
            .collect();
        let health = match snapshot.health {
            SnapshotHealth::Healthy => "healthy",
            SnapshotHealth::Degraded => "degraded",
            SnapshotHealth::Unhealthy => "unhealthy",
        };
        sqlx::query(
            r"INSERT INTO snapshots (
                id, sequence, taken_at, orchestration_id,
                cpu_percent, memory_percent, disk_io_percent, network_io_percent,
                throughput, latency_ms, error_rate, success_rate, sla_percent, cost,
                active_orchestrations, queued_orchestrations, completed_count, failed_count,
                pool_utilization, stages_completed_since_last, stages_failed_since_last, health
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.sequence as i64)
        .bind(snapshot.taken_at.to_rfc3339())
        .bind(snapshot.orchestration_id.map(|id| id.to_string()))
        .bind(snapshot.cpu_percent)
        .bind(snapshot.memory_percent)
        .bind(snapshot.disk_io_percent)
        .bind(snapshot.network_io_percent)
        .bind(snapshot.throughput)
        .bind(snapshot.latency_ms)
        .bind(snapshot.error_rate)
        .bind(snapshot.success_rate)
        .bind(snapshot.sla_percent)
        .bind(snapshot.cost)
        .bind(i64::from(snapshot.active_orchestrations))
        .bind(i64::from(snapshot.queued_orchestrations))
        .bind(i64::from(snapshot.completed_count))
        .bind(i64::from(snapshot.failed_count))
        .bind(json_str(&pool_utilization)?)
        .bind(i64::from(snapshot.stages_completed_since_last))
        .bind(i64::from(snapshot.stages_failed_since_last))
        .bind(health)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent_snapshots(&self, limit: usize) -> RepositoryResult<Vec<Snapshot>> {
        let rows: Vec<SnapshotRow> =
            sqlx::query_as("SELECT * FROM snapshots ORDER BY sequence DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn save_alert(&self, alert: &Alert) -> RepositoryResult<()> {
        sqlx::query(
            r"INSERT INTO alerts (
                id, kind, severity, message, raised_at, acknowledged, acknowledged_by,
                resolved_at, resolved_by, resolution_note, related_orchestration
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(alert.id.to_string())
        .bind(alert_kind_str(alert.kind))
        .bind(severity_str(alert.severity))
        .bind(&alert.message)
        .bind(alert.raised_at.to_rfc3339())
        .bind(i64::from(alert.acknowledged))
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at.map(|t| t.to_rfc3339()))
        .bind(&alert.resolved_by)
        .bind(&alert.resolution_note)
        .bind(alert.related_orchestration.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> RepositoryResult<()> {
        sqlx::query(
            r"UPDATE alerts SET
                acknowledged = ?, acknowledged_by = ?,
                resolved_at = ?, resolved_by = ?, resolution_note = ?
            WHERE id = ?",
        )
        .bind(i64::from(alert.acknowledged))
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at.map(|t| t.to_rfc3339()))
        .bind(&alert.resolved_by)
        .bind(&alert.resolution_note)
        .bind(alert.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_open_alerts(&self) -> RepositoryResult<Vec<Alert>> {
        let rows: Vec<AlertRow> =
            sqlx::query_as("SELECT * FROM alerts WHERE resolved_at IS NULL ORDER BY raised_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Alert::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::ports::Repository;

    async fn repo() -> SqliteRepository {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        SqliteRepository::new(pool)
    }

    #[tokio::test]
    async fn orchestration_round_trips_through_sqlite() {
        let repo = repo().await;
        let o = Orchestration::new("profile-customers", OrchestrationType::Discovery);
        repo.create_orchestration(&o).await.unwrap();

        let fetched = repo.get_orchestration(o.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, o.id);
        assert_eq!(fetched.name, o.name);
        assert_eq!(fetched.status, OrchestrationStatus::Initializing);
    }

    #[tokio::test]
    async fn update_orchestration_persists_status_transition() {
        let repo = repo().await;
        let mut o = Orchestration::new("profile-customers", OrchestrationType::Discovery);
        repo.create_orchestration(&o).await.unwrap();

        o.transition_to(OrchestrationStatus::Planning).unwrap();
        repo.update_orchestration(&o).await.unwrap();

        let fetched = repo.get_orchestration(o.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrchestrationStatus::Planning);
    }

    #[tokio::test]
    async fn list_orchestrations_filters_by_status() {
        let repo = repo().await;
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
        assert_eq!(filtered[0].id, running.id);
    }

    #[tokio::test]
    async fn stage_round_trips_with_dependencies() {
        let repo = repo().await;
        let o = Orchestration::new("profile-customers", OrchestrationType::Discovery);
        repo.create_orchestration(&o).await.unwrap();

        let a = Stage::new(o.id, "discover", "discover");
        let mut b = Stage::new(o.id, "profile", "profile");
        b.depends_on = vec![a.id];
        repo.create_stages(&[a.clone(), b.clone()]).await.unwrap();

        let fetched = repo.get_stage(b.id).await.unwrap().unwrap();
        assert_eq!(fetched.depends_on, vec![a.id]);
    }

    #[tokio::test]
    async fn alert_round_trips_and_filters_open() {
        let repo = repo().await;
        let mut alert = Alert::new(AlertKind::PoolSaturation, Severity::Critical, "cpu pool hot");
        repo.save_alert(&alert).await.unwrap();

        let open = repo.list_open_alerts().await.unwrap();
        assert_eq!(open.len(), 1);

        alert.resolve("oncall", "pool scaled up");
        repo.update_alert(&alert).await.unwrap();
        let open = repo.list_open_alerts().await.unwrap();
        assert!(open.is_empty());
    }
}
