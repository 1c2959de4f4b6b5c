//! Orchestration domain model — the unit of work (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// What kind of scan work this orchestration performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationType {
    Discovery,
    Comprehensive,
    Quality,
    Compliance,
    Classification,
    Lineage,
    Incremental,
    Emergency,
    Maintenance,
    Custom,
}

impl OrchestrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Comprehensive => "comprehensive",
            Self::Quality => "quality",
            Self::Compliance => "compliance",
            Self::Classification => "classification",
            Self::Lineage => "lineage",
            Self::Incremental => "incremental",
            Self::Emergency => "emergency",
            Self::Maintenance => "maintenance",
            Self::Custom => "custom",
        }
    }
}

/// How stages within this orchestration are expected to be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    Synchronous,
    Asynchronous,
    Streaming,
    Batch,
    Hybrid,
    Adaptive,
}

/// Total order over orchestration urgency. `Ord` derives in declaration
/// order with `#[repr]` values assigned so `Critical > High > ... >
/// Background` compares correctly with the default derive (later variants
/// sort greater).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Background = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Lifecycle status of an orchestration (§4.1's state machine).
///
/// ```text
/// initializing -> planning -> (pending_approval)? -> queued -> running
/// running <-> paused
/// running -> completing -> completed
/// any -> failed | cancelled | terminated (terminal)
/// failed -> retrying -> queued (if retry_count < max)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Initializing,
    Planning,
    PendingApproval,
    Queued,
    Running,
    Paused,
    Completing,
    Completed,
    Failed,
    Retrying,
    Cancelled,
    Terminated,
}

impl OrchestrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Planning => "planning",
            Self::PendingApproval => "pending_approval",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Cancelled => "cancelled",
            Self::Terminated => "terminated",
        }
    }

    /// Terminal statuses never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Terminated
        )
    }

    /// Legal next statuses from this one. `Cancel`/`Terminate` are legal
    /// from any non-terminal status and are handled separately by callers
    /// rather than listed on every arm.
    pub fn valid_transitions(&self) -> &'static [OrchestrationStatus] {
        match self {
            Self::Initializing => &[Self::Planning],
            Self::Planning => &[Self::PendingApproval, Self::Queued],
            Self::PendingApproval => &[Self::Queued, Self::Cancelled],
            Self::Queued => &[Self::Running],
            Self::Running => &[Self::Paused, Self::Completing, Self::Failed],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::Completing => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[Self::Retrying],
            Self::Retrying => &[Self::Queued],
            Self::Cancelled => &[],
            Self::Terminated => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        if matches!(next, Self::Cancelled | Self::Terminated) {
            return !self.is_terminal();
        }
        self.valid_transitions().contains(&next)
    }
}

/// Monotonically non-decreasing progress counters (resets only on retry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stages_done: u32,
    pub stages_total: u32,
    pub tasks_done: u32,
    pub tasks_total: u32,
}

impl Progress {
    /// `percent = 100 * stages_done/stages_total`, rounded; `0` when there
    /// are no stages yet.
    pub fn percent(&self) -> u32 {
        if self.stages_total == 0 {
            return 0;
        }
        ((self.stages_done as f64 / self.stages_total as f64) * 100.0).round() as u32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Optional cost ceiling for an orchestration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub limit: Option<f64>,
    pub estimated_cost: f64,
    pub actual_cost: f64,
}

impl Budget {
    /// Whether `actual_cost` is still within `limit` (no limit = always
    /// within budget).
    pub fn within_limit(&self) -> bool {
        self.limit.map_or(true, |l| self.actual_cost <= l)
    }

    pub fn projected_over(&self, projected: f64) -> Option<f64> {
        self.limit
            .filter(|&l| projected > l)
            .map(|l| projected - l)
    }
}

/// Retry/backoff bookkeeping carried on the orchestration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryState {
    pub retry_count: u32,
    pub max_retries: u32,
}

impl RetryState {
    pub fn has_attempts_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Identifies a data asset, source, rule, or classification this
/// orchestration targets. Opaque beyond its kind and reference string —
/// the core never resolves or interprets the referenced resource itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    DataSource(String),
    Asset(String),
    Rule(String),
    Classification(String),
}

/// The unit of work the orchestration core schedules and drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: Uuid,
    pub name: String,
    pub orchestration_type: OrchestrationType,
    pub mode: OrchestrationMode,
    pub priority: Priority,
    pub status: OrchestrationStatus,

    pub scheduled_start: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub completion: Option<DateTime<Utc>>,
    pub max_runtime_secs: Option<u64>,

    pub budget: Budget,
    pub targets: HashSet<TargetRef>,

    pub progress: Progress,
    pub retry: RetryState,
    pub retry_backoff_base_ms: u64,

    pub resource_reservation_id: Option<Uuid>,
    pub required_approvals: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub status_since: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl Orchestration {
    pub fn new(name: impl Into<String>, orchestration_type: OrchestrationType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            orchestration_type,
            mode: OrchestrationMode::Asynchronous,
            priority: Priority::default(),
            status: OrchestrationStatus::Initializing,
            scheduled_start: None,
            actual_start: None,
            deadline: None,
            completion: None,
            max_runtime_secs: None,
            budget: Budget::default(),
            targets: HashSet::new(),
            progress: Progress::default(),
            retry: RetryState::default(),
            retry_backoff_base_ms: 1000,
            resource_reservation_id: None,
            required_approvals: Vec::new(),
            created_at: Utc::now(),
            status_since: Utc::now(),
            last_error: None,
        }
    }

    /// Whether §4.1's approval gate holds this orchestration in
    /// `pending_approval`.
    pub fn requires_approval(&self) -> bool {
        !self.required_approvals.is_empty()
    }

    /// Whether a `pending_approval` hold has outlived `approval_timeout_ms`
    /// (§6's config enumeration, §C's elapsing-to-`cancelled` behavior).
    pub fn approval_timed_out(&self, approval_timeout_ms: u64) -> bool {
        self.status == OrchestrationStatus::PendingApproval
            && Utc::now().signed_duration_since(self.status_since).num_milliseconds()
                >= approval_timeout_ms as i64
    }

    /// Attempt a status transition, enforcing §4.1's state machine.
    /// Returns the prior status on success.
    pub fn transition_to(
        &mut self,
        next: OrchestrationStatus,
    ) -> Result<OrchestrationStatus, String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal transition from {:?} to {:?}",
                self.status, next
            ));
        }
        let prior = self.status;
        self.status = next;
        self.status_since = Utc::now();
        if next == OrchestrationStatus::Retrying {
            self.progress.reset();
            self.retry.retry_count += 1;
        }
        Ok(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_rounds() {
        let p = Progress {
            stages_done: 1,
            stages_total: 3,
            ..Default::default()
        };
        assert_eq!(p.percent(), 33);
    }

    #[test]
    fn progress_percent_zero_total_is_zero() {
        assert_eq!(Progress::default().percent(), 0);
    }

    #[test]
    fn priority_total_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::Low > Priority::Background);
    }

    #[test]
    fn legal_lifecycle_path() {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        assert!(o.transition_to(OrchestrationStatus::Planning).is_ok());
        assert!(o.transition_to(OrchestrationStatus::Queued).is_ok());
        assert!(o.transition_to(OrchestrationStatus::Running).is_ok());
        assert!(o.transition_to(OrchestrationStatus::Completing).is_ok());
        assert!(o.transition_to(OrchestrationStatus::Completed).is_ok());
        assert!(o.status.is_terminal());
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        assert!(o.transition_to(OrchestrationStatus::Completed).is_err());
    }

    #[test]
    fn approval_timeout_only_fires_in_pending_approval() {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        o.status_since = Utc::now() - chrono::Duration::hours(1);
        assert!(!o.approval_timed_out(1_000));

        o.status = OrchestrationStatus::PendingApproval;
        assert!(o.approval_timed_out(1_000));
        assert!(!o.approval_timed_out(u64::MAX));
    }

    #[test]
    fn pending_approval_can_cancel_after_timeout() {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        o.transition_to(OrchestrationStatus::Planning).unwrap();
        o.status = OrchestrationStatus::PendingApproval;
        assert!(o.transition_to(OrchestrationStatus::Cancelled).is_ok());
        assert!(o.status.is_terminal());
    }

    #[test]
    fn retry_path_resets_progress() {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        o.retry.max_retries = 3;
        o.progress.stages_done = 2;
        o.progress.stages_total = 4;
        o.status = OrchestrationStatus::Failed;
        o.transition_to(OrchestrationStatus::Retrying).unwrap();
        assert_eq!(o.progress.stages_done, 0);
        assert_eq!(o.retry.retry_count, 1);
    }

    #[test]
    fn budget_within_limit_with_no_limit() {
        let b = Budget::default();
        assert!(b.within_limit());
    }

    #[test]
    fn budget_detects_overrun() {
        let b = Budget {
            limit: Some(100.0),
            actual_cost: 50.0,
            ..Default::default()
        };
        assert_eq!(b.projected_over(150.0), Some(50.0));
        assert_eq!(b.projected_over(90.0), None);
    }
}
