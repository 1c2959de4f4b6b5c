//! Monitor alerts (§4.6): threshold-triggered notifications derived from
//! snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an alert, ordered low to high so `Severity::Critical >
/// Severity::Warning` compares as expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What condition triggered the alert; names follow §3's `kind` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PerformanceDegradation,
    ResourceExhaustion,
    ScanFailure,
    Timeout,
    Anomaly,
    Overload,
    /// Retained alongside §3's six kinds for pool-scoped alerts the
    /// original list doesn't name individually.
    PoolSaturation,
    HighFailureRate,
    DeadlineAtRisk,
    BudgetAtRisk,
    QueueBacklog,
}

/// A single alert raised by the Monitor against a threshold rule or the
/// anomaly detector. Lifecycle: new → acknowledged(by) → resolved(by,
/// note); info alerts auto-resolve after one hour unacknowledged, and
/// resolved alerts are purged from the active set after 24 hours (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    /// `None` for a system-scope alert; `Some` for one tied to a single
    /// orchestration.
    pub related_orchestration: Option<Uuid>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            raised_at: Utc::now(),
            related_orchestration: None,
            acknowledged: false,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    pub fn scoped_to(mut self, orchestration_id: Uuid) -> Self {
        self.related_orchestration = Some(orchestration_id);
        self
    }

    /// R3: acknowledging an already-acknowledged alert is a no-op that
    /// keeps the original acknowledger.
    pub fn acknowledge(&mut self, by: impl Into<String>) {
        if self.acknowledged {
            return;
        }
        self.acknowledged = true;
        self.acknowledged_by = Some(by.into());
    }

    /// R3: resolving an already-resolved alert is a no-op.
    pub fn resolve(&mut self, by: impl Into<String>, note: impl Into<String>) {
        if self.resolved_at.is_some() {
            return;
        }
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(by.into());
        self.resolution_note = Some(note.into());
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Whether this alert qualifies for the §4.6 info auto-resolve: open,
    /// `Info` severity, and raised at least one hour ago.
    pub fn is_stale_info(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.severity == Severity::Info && now - self.raised_at >= Duration::hours(1)
    }

    /// Whether this alert should be purged from the active set: resolved
    /// at least 24 hours ago.
    pub fn should_purge(&self, now: DateTime<Utc>) -> bool {
        self.resolved_at.is_some_and(|resolved| now - resolved >= Duration::hours(24))
    }
}
