//! Scheduling priority calculation (§4.2).
//!
//! Priority formula: `base_priority + (dependency_depth * depth_weight) +
//! deadline_boost + aging_credit`. Aging credit prevents low-priority
//! orchestrations from starving behind a continuous stream of
//! higher-priority arrivals: it grows with time spent waiting in the
//! scheduler queue, uncapped, so it eventually outweighs any fixed
//! priority gap.

use chrono::{DateTime, Utc};

use crate::domain::models::{Orchestration, Priority};

/// Computes a scalar scheduling priority combining base urgency,
/// dependency depth, deadline pressure, and queue aging.
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    depth_weight: f64,
    deadline_boost_max: f64,
    aging_credit_per_sec: f64,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityCalculator {
    pub fn new() -> Self {
        Self {
            depth_weight: 0.5,
            deadline_boost_max: 3.0,
            aging_credit_per_sec: 0.01,
        }
    }

    pub fn with_weights(depth_weight: f64, deadline_boost_max: f64, aging_credit_per_sec: f64) -> Self {
        Self {
            depth_weight,
            deadline_boost_max,
            aging_credit_per_sec,
        }
    }

    /// `dependency_depth` is the orchestration's stage DAG depth at its
    /// deepest ready point; `queued_since` is when it entered the
    /// scheduler queue.
    pub fn calculate(
        &self,
        orchestration: &Orchestration,
        dependency_depth: u32,
        queued_since: Option<DateTime<Utc>>,
    ) -> f64 {
        let base = priority_base(orchestration.priority);
        let depth_boost = f64::from(dependency_depth) * self.depth_weight;
        let deadline_boost = self.deadline_boost(orchestration);
        let aging = self.aging_credit(queued_since);

        base + depth_boost + deadline_boost + aging
    }

    fn deadline_boost(&self, orchestration: &Orchestration) -> f64 {
        let Some(deadline) = orchestration.deadline else {
            return 0.0;
        };
        let now = Utc::now();
        if deadline <= now {
            return self.deadline_boost_max;
        }

        let total_duration = deadline - orchestration.created_at;
        let remaining = deadline - now;
        if total_duration.num_seconds() <= 0 {
            return 0.0;
        }

        let ratio = 1.0 - (remaining.num_seconds() as f64 / total_duration.num_seconds() as f64);
        ratio.clamp(0.0, 1.0) * self.deadline_boost_max
    }

    fn aging_credit(&self, queued_since: Option<DateTime<Utc>>) -> f64 {
        let Some(queued_since) = queued_since else {
            return 0.0;
        };
        let waited = (Utc::now() - queued_since).num_seconds().max(0);
        waited as f64 * self.aging_credit_per_sec
    }
}

fn priority_base(priority: Priority) -> f64 {
    match priority {
        Priority::Background => 0.0,
        Priority::Low => 1.0,
        Priority::Medium => 2.0,
        Priority::High => 3.0,
        Priority::Critical => 4.0,
    }
}
