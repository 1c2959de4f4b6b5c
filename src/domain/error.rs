//! Domain error taxonomy for the scan orchestration core.
//!
//! Each variant corresponds to one outcome class a caller or the owning
//! actor needs to branch on. Stage-level failures additionally classify
//! themselves as retryable or fatal so the orchestrator never has to
//! consult a side channel to decide whether to consume a retry attempt.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error returned by inbound-port operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestrationError {
    /// Request failed validation at an inbound port.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested transition is illegal from the entity's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The Resource Broker could not satisfy a reservation, even with
    /// auto-scaling.
    #[error("resource denied for orchestration {orchestration_id}: {reason}")]
    ResourceDenied {
        orchestration_id: Uuid,
        reason: String,
    },

    /// A mandatory, non-overridable dependency edge was not satisfied
    /// within its wait timeout.
    #[error("dependency timeout on edge {edge_id} waiting for {source}")]
    DependencyTimeout { edge_id: Uuid, source: Uuid },

    /// Projected cost for a running orchestration exceeds its budget.
    #[error("budget exceeded for orchestration {orchestration_id}: projected {projected}, budget {budget}")]
    BudgetExceeded {
        orchestration_id: Uuid,
        projected: f64,
        budget: f64,
    },

    /// Cooperative cancellation completed.
    #[error("orchestration {0} cancelled: {1}")]
    Cancelled(Uuid, String),

    /// Forced shutdown after the cancellation grace period elapsed.
    #[error("orchestration {0} terminated: {1}")]
    Terminated(Uuid, String),

    /// An entity referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invariant was violated; this always indicates a bug, not bad
    /// input. Logged with full context by the caller; surfaced to
    /// external callers as a generic failure.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Classification of a failure produced while invoking a `ScanOperation`
/// for one stage.
///
/// The distinction drives §4.1's failure semantics: retryable errors
/// consume an attempt and reschedule after backoff; fatal errors fail the
/// stage immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// Transient error (I/O, deadline exceeded) — worth retrying.
    #[error("retryable stage failure: {0}")]
    Retryable(String),

    /// Non-retryable error (invalid input, unsupported operation, or
    /// retries exhausted).
    #[error("fatal stage failure: {0}")]
    Fatal(String),
}

impl StageFailure {
    /// Whether this failure should consume a retry attempt and reschedule.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Whether this failure is terminal for the stage.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(m) | Self::Fatal(m) => m,
        }
    }
}

/// Errors surfaced by the outbound `Repository` port.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("entity not found: {kind} {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors surfaced by the outbound `EventSink` port.
#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("failed to deliver snapshot: {0}")]
    SnapshotDeliveryFailed(String),

    #[error("failed to deliver alert: {0}")]
    AlertDeliveryFailed(String),
}

pub type EventSinkResult<T> = Result<T, EventSinkError>;

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid worker_count: {0}, must be at least 1")]
    InvalidWorkerCount(usize),

    #[error("invalid scheduler_queue_capacity: {0}, must be at least 1")]
    InvalidQueueCapacity(usize),

    #[error(
        "invalid backoff configuration: base_ms ({0}) must be less than cap_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("invalid pool_defaults: {0}")]
    InvalidPoolDefaults(String),

    #[error("failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to extract configuration: {0}")]
    ExtractError(String),
}
