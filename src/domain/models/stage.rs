//! Stage domain model — a single node in an orchestration's DAG (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a stage within its owning orchestration's DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Ready,
    Blocked,
    Running,
    Retrying,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Blocked => "blocked",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "ready" => Self::Ready,
            "blocked" => Self::Blocked,
            "running" => Self::Running,
            "retrying" => Self::Retrying,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }

    pub fn valid_transitions(&self) -> &'static [StageStatus] {
        match self {
            Self::Pending => &[Self::Ready, Self::Blocked, Self::Cancelled],
            Self::Blocked => &[Self::Ready, Self::Cancelled],
            Self::Ready => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Retrying => &[Self::Ready],
            Self::Failed => &[Self::Retrying, Self::Skipped],
            Self::Completed => &[],
            Self::Skipped => &[],
            Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Retry policy attached to a stage; consumed on `StageFailure::Retryable`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Upper bound of the uniform jitter added on top of the exponential
    /// term, so that stages retrying in lockstep don't all wake at once.
    pub jitter_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
            jitter_max_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// `backoff(attempt) = min(cap, base * 2^attempt) + jitter` per §4.1,
    /// doubling per attempt already made and capped before jitter is
    /// added (jitter may push the result slightly past `backoff_cap_ms`).
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let scaled = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = scaled.min(self.backoff_cap_ms);
        capped.saturating_add(self.jitter_for(attempt))
    }

    fn jitter_for(&self, _attempt: u32) -> u64 {
        if self.jitter_max_ms == 0 {
            return 0;
        }
        use rand::Rng;
        rand::thread_rng().gen_range(0..=self.jitter_max_ms)
    }
}

/// Classification attached to a stage's terminal failure, mirroring
/// `StageFailure` at the domain-model (persisted) level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFailureKind {
    Retryable,
    Fatal,
}

/// Recorded outcome of the most recent stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub failure_kind: Option<StageFailureKind>,
    pub message: Option<String>,
    pub attempt: u32,
    pub finished_at: DateTime<Utc>,
}

/// A single node in an orchestration's DAG: one unit of scan work bound to
/// a `ScanOperation` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub orchestration_id: Uuid,
    pub name: String,
    pub operation: String,
    pub depends_on: Vec<Uuid>,
    pub status: StageStatus,
    pub retry_policy: RetryPolicy,
    pub attempt: u32,
    pub priority_hint: i64,
    pub estimated_cost: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<StageOutcome>,
}

impl Stage {
    pub fn new(orchestration_id: Uuid, name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            orchestration_id,
            name: name.into(),
            operation: operation.into(),
            depends_on: Vec::new(),
            status: StageStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            priority_hint: 0,
            estimated_cost: 0.0,
            started_at: None,
            last_outcome: None,
        }
    }

    pub fn transition_to(&mut self, next: StageStatus) -> Result<StageStatus, String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal stage transition from {:?} to {:?}",
                self.status, next
            ));
        }
        let prior = self.status;
        self.status = next;
        Ok(prior)
    }

    /// Whether this stage still has a retry attempt available after a
    /// retryable failure.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.retry_policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> Stage {
        Stage::new(Uuid::new_v4(), "profile-table", "profile")
    }

    #[test]
    fn status_roundtrips_through_str() {
        for s in [
            StageStatus::Pending,
            StageStatus::Ready,
            StageStatus::Blocked,
            StageStatus::Running,
            StageStatus::Retrying,
            StageStatus::Completed,
            StageStatus::Failed,
            StageStatus::Skipped,
            StageStatus::Cancelled,
        ] {
            assert_eq!(StageStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn legal_path_pending_to_completed() {
        let mut s = stage();
        assert!(s.transition_to(StageStatus::Ready).is_ok());
        assert!(s.transition_to(StageStatus::Running).is_ok());
        assert!(s.transition_to(StageStatus::Completed).is_ok());
        assert!(s.status.is_terminal());
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut s = stage();
        assert!(s.transition_to(StageStatus::Completed).is_err());
    }

    #[test]
    fn retry_policy_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 100,
            backoff_cap_ms: 1000,
            jitter_max_ms: 0,
        };
        assert_eq!(p.delay_for_attempt(0), 100);
        assert_eq!(p.delay_for_attempt(1), 200);
        assert_eq!(p.delay_for_attempt(2), 400);
        assert_eq!(p.delay_for_attempt(10), 1000);
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let mut s = stage();
        s.retry_policy.max_attempts = 2;
        s.attempt = 1;
        assert!(s.can_retry());
        s.attempt = 2;
        assert!(!s.can_retry());
    }
}
