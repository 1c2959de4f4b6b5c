//! Monitor snapshots (§4.6): periodic point-in-time system state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::resource::ResourceType;

/// Coarse-grained health rollup carried on a snapshot, independent of any
/// single pool's `PoolHealth` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A single point-in-time sample of orchestration and resource state,
/// published by the Monitor on each sampling tick. `orchestration_id` is
/// `None` for a system-wide snapshot and `Some` for a per-orchestration
/// one; the Monitor takes both on independent intervals per §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub orchestration_id: Option<Uuid>,

    // System metrics, from the injected `SystemMetricsProbe`.
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_io_percent: f64,
    pub network_io_percent: f64,

    // Business metrics.
    pub throughput: f64,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub sla_percent: f64,
    pub cost: f64,

    // Discrete counts.
    pub active_orchestrations: u32,
    pub queued_orchestrations: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub pool_utilization: HashMap<ResourceType, f64>,
    pub stages_completed_since_last: u32,
    pub stages_failed_since_last: u32,

    pub health: SnapshotHealth,
}

impl Snapshot {
    pub fn new(sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            taken_at: Utc::now(),
            orchestration_id: None,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_io_percent: 0.0,
            network_io_percent: 0.0,
            throughput: 0.0,
            latency_ms: 0.0,
            error_rate: 0.0,
            success_rate: 1.0,
            sla_percent: 100.0,
            cost: 0.0,
            active_orchestrations: 0,
            queued_orchestrations: 0,
            completed_count: 0,
            failed_count: 0,
            pool_utilization: HashMap::new(),
            stages_completed_since_last: 0,
            stages_failed_since_last: 0,
            health: SnapshotHealth::Healthy,
        }
    }

    /// Failure rate over stages finishing since the prior snapshot; `0.0`
    /// when nothing finished.
    pub fn failure_rate(&self) -> f64 {
        let total = self.stages_completed_since_last + self.stages_failed_since_last;
        if total == 0 {
            return 0.0;
        }
        f64::from(self.stages_failed_since_last) / f64::from(total)
    }

    /// Total stages this snapshot's window covers, used by the §4.6
    /// "over ≥100 items" rule qualifier.
    pub fn items_observed(&self) -> u32 {
        self.stages_completed_since_last + self.stages_failed_since_last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_zero_with_no_activity() {
        let snap = Snapshot::new(1);
        assert_eq!(snap.failure_rate(), 0.0);
    }

    #[test]
    fn failure_rate_computed_correctly() {
        let mut snap = Snapshot::new(1);
        snap.stages_completed_since_last = 3;
        snap.stages_failed_since_last = 1;
        assert_eq!(snap.failure_rate(), 0.25);
    }

    #[test]
    fn items_observed_sums_completed_and_failed() {
        let mut snap = Snapshot::new(1);
        snap.stages_completed_since_last = 90;
        snap.stages_failed_since_last = 15;
        assert_eq!(snap.items_observed(), 105);
    }
}
