//! Adaptive strategy engine (§4.5): generates one candidate plan per
//! `StrategyClass` for an orchestration's current situation and selects
//! the best-scoring one.
//!
//! Candidate generation is a fixed, deterministic heuristic per class —
//! there is no learned model here, just the weighted-sum scoring already
//! defined on `StrategyPlan`.

use chrono::Utc;

use crate::domain::models::{Orchestration, ScoringWeights, StrategyClass, StrategyPlan};

const AVG_STAGE_COST: f64 = 1.0;

/// Generates and scores candidate execution strategies for an
/// orchestration given its current resource picture.
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    weights: ScoringWeights,
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

impl StrategyEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Build the four candidate plans for `orchestration` and return the
    /// best-scoring one. `ready_stage_count` is how many stages could run
    /// right now; `available_concurrency` is the worker/slot ceiling the
    /// resource broker currently allows; `pool_utilization` is the mean
    /// utilization across reserved pools (0.0-1.0), used as a risk proxy.
    pub fn plan(
        &self,
        orchestration: &Orchestration,
        ready_stage_count: u32,
        available_concurrency: u32,
        pool_utilization: f64,
    ) -> StrategyPlan {
        let deadline_slack_ms = orchestration
            .deadline
            .map(|d| (d - Utc::now()).num_milliseconds())
            .unwrap_or(i64::MAX / 2);

        let candidates = vec![
            self.adaptive(ready_stage_count, available_concurrency, pool_utilization, deadline_slack_ms),
            self.aggressive(ready_stage_count, available_concurrency, pool_utilization, deadline_slack_ms),
            self.conservative(ready_stage_count, available_concurrency, pool_utilization, deadline_slack_ms),
            self.deadline_first(ready_stage_count, available_concurrency, pool_utilization, deadline_slack_ms),
            self.cost_optimized(ready_stage_count, pool_utilization, deadline_slack_ms),
        ];

        crate::domain::models::select_best(candidates, &self.weights)
            .expect("candidate list is always non-empty")
    }

    /// After a stage completes, revise the remaining plan in place (§4.5)
    /// and rescore it under this engine's weights.
    pub fn revise(&self, plan: &mut StrategyPlan, recent_success_rate: f64, pool_is_bottlenecked: bool, live_worker_capacity: u32) {
        plan.adapt(recent_success_rate, pool_is_bottlenecked, live_worker_capacity);
        plan.score_with(&self.weights);
    }

    /// Blend of `aggressive` and `conservative`, weighted by live headroom
    /// (`1 - pool_utilization`): idle pools pull this candidate toward
    /// aggressive's concurrency, saturated pools toward conservative's.
    fn adaptive(
        &self,
        ready_stage_count: u32,
        available_concurrency: u32,
        pool_utilization: f64,
        deadline_slack_ms: i64,
    ) -> StrategyPlan {
        let headroom = (1.0 - pool_utilization).clamp(0.0, 1.0);
        let ceiling = available_concurrency.max(1) as f64;
        let concurrency = (1.0 + headroom * (ceiling - 1.0)).round().max(1.0) as u32;
        let cost = f64::from(ready_stage_count) * AVG_STAGE_COST * (0.6 + 0.4 * headroom);
        let risk = pool_utilization * (1.5 - headroom);
        StrategyPlan::new(StrategyClass::Adaptive, concurrency, cost, risk, deadline_slack_ms)
    }

    fn aggressive(
        &self,
        ready_stage_count: u32,
        available_concurrency: u32,
        pool_utilization: f64,
        deadline_slack_ms: i64,
    ) -> StrategyPlan {
        let concurrency = available_concurrency.max(1);
        let cost = f64::from(ready_stage_count) * AVG_STAGE_COST;
        let risk = pool_utilization * 1.5;
        StrategyPlan::new(StrategyClass::Aggressive, concurrency, cost, risk, deadline_slack_ms)
    }

    fn conservative(
        &self,
        ready_stage_count: u32,
        available_concurrency: u32,
        pool_utilization: f64,
        deadline_slack_ms: i64,
    ) -> StrategyPlan {
        let concurrency = (available_concurrency / 2).max(1).min(available_concurrency.max(1));
        let cost = f64::from(ready_stage_count) * AVG_STAGE_COST * 0.9;
        let risk = pool_utilization * 0.5;
        StrategyPlan::new(StrategyClass::Conservative, concurrency, cost, risk, deadline_slack_ms)
    }

    fn deadline_first(
        &self,
        ready_stage_count: u32,
        available_concurrency: u32,
        pool_utilization: f64,
        deadline_slack_ms: i64,
    ) -> StrategyPlan {
        let concurrency = available_concurrency.max(1);
        let cost = f64::from(ready_stage_count) * AVG_STAGE_COST * 1.1;
        let risk = pool_utilization;
        StrategyPlan::new(StrategyClass::DeadlineFirst, concurrency, cost, risk, deadline_slack_ms)
    }

    fn cost_optimized(
        &self,
        ready_stage_count: u32,
        pool_utilization: f64,
        deadline_slack_ms: i64,
    ) -> StrategyPlan {
        let concurrency = 1u32.max(ready_stage_count.min(2));
        let cost = f64::from(ready_stage_count) * AVG_STAGE_COST * 0.6;
        let risk = pool_utilization * 0.25;
        StrategyPlan::new(StrategyClass::CostOptimized, concurrency, cost, risk, deadline_slack_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OrchestrationType;
    use chrono::Duration;

    fn orch() -> Orchestration {
        Orchestration::new("test", OrchestrationType::Discovery)
    }

    #[test]
    fn idle_pool_favors_aggressive_or_deadline_classes() {
        let engine = StrategyEngine::default();
        let plan = engine.plan(&orch(), 20, 16, 0.1);
        assert!(plan.projected_concurrency > 1);
    }

    #[test]
    fn saturated_pool_lowers_aggressive_appeal() {
        let engine = StrategyEngine::default();
        let plan_idle = engine.plan(&orch(), 20, 16, 0.05);
        let plan_saturated = engine.plan(&orch(), 20, 16, 0.95);
        assert!(plan_saturated.score <= plan_idle.score);
    }

    #[test]
    fn overdue_deadline_selects_deadline_first_when_others_tie() {
        let engine = StrategyEngine::default();
        let mut o = orch();
        o.deadline = Some(Utc::now() - Duration::minutes(5));
        let plan = engine.plan(&o, 10, 8, 0.2);
        assert!(plan.projected_deadline_slack_ms < 0);
    }
}
