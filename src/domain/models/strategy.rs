//! Adaptive strategy plans (§4.5): deterministic candidate generation and
//! weighted scoring, no learned tuning.

use serde::{Deserialize, Serialize};

/// Broad class of execution strategy a candidate plan represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyClass {
    /// Blends aggressive and conservative formulas in proportion to live
    /// headroom; the engine's default recommendation.
    Adaptive,
    /// Maximize parallelism within resource limits.
    Aggressive,
    /// Spread load to minimize pool pressure.
    Conservative,
    /// Favor the orchestrations closest to their deadline.
    DeadlineFirst,
    /// Favor the cheapest viable plan.
    CostOptimized,
}

/// Weights applied to each scoring factor; mirrors the priority
/// calculator's weighted-sum idiom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub throughput_weight: f64,
    pub cost_weight: f64,
    pub risk_weight: f64,
    pub deadline_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            throughput_weight: 1.0,
            cost_weight: 0.5,
            risk_weight: 0.75,
            deadline_weight: 1.25,
        }
    }
}

/// One candidate execution plan considered by the strategy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub class: StrategyClass,
    pub projected_concurrency: u32,
    pub projected_cost: f64,
    pub projected_risk: f64,
    pub projected_deadline_slack_ms: i64,
    pub score: f64,
}

impl StrategyPlan {
    pub fn new(
        class: StrategyClass,
        projected_concurrency: u32,
        projected_cost: f64,
        projected_risk: f64,
        projected_deadline_slack_ms: i64,
    ) -> Self {
        Self {
            class,
            projected_concurrency,
            projected_cost,
            projected_risk,
            projected_deadline_slack_ms,
            score: 0.0,
        }
    }

    /// Score this candidate under `weights`; higher is better. Cost and
    /// risk subtract, throughput and deadline slack add — consistent with
    /// the priority calculator's base-plus-adjustment formula.
    pub fn score_with(&mut self, weights: &ScoringWeights) -> f64 {
        let throughput_term = f64::from(self.projected_concurrency) * weights.throughput_weight;
        let cost_term = self.projected_cost * weights.cost_weight;
        let risk_term = self.projected_risk * weights.risk_weight;
        let deadline_term = if self.projected_deadline_slack_ms < 0 {
            (self.projected_deadline_slack_ms.unsigned_abs() as f64) * weights.deadline_weight
        } else {
            0.0
        };
        self.score = throughput_term - cost_term - risk_term - deadline_term;
        self.score
    }
}

impl StrategyPlan {
    /// Revise this plan after a stage completes (§4.5): halve concurrency
    /// when success is poor or a pool is bottlenecked, add one slot of
    /// headroom when success is excellent and capacity allows, otherwise
    /// leave the plan unchanged. Concurrency never exceeds
    /// `live_worker_capacity` and never drops below one.
    pub fn adapt(&mut self, recent_success_rate: f64, pool_is_bottlenecked: bool, live_worker_capacity: u32) {
        if recent_success_rate < 0.5 || pool_is_bottlenecked {
            self.projected_concurrency = (self.projected_concurrency / 2).max(1);
        } else if recent_success_rate >= 0.95 && self.projected_concurrency < live_worker_capacity {
            self.projected_concurrency += 1;
        }
        self.projected_concurrency = self.projected_concurrency.min(live_worker_capacity.max(1));
    }
}

/// Select the highest-scoring plan from a set of candidates, breaking
/// ties by lowest projected cost.
pub fn select_best(mut candidates: Vec<StrategyPlan>, weights: &ScoringWeights) -> Option<StrategyPlan> {
    for plan in &mut candidates {
        plan.score_with(weights);
    }
    candidates.into_iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            if candidate.score > current.score
                || ((candidate.score - current.score).abs() < f64::EPSILON
                    && candidate.projected_cost < current.projected_cost)
            {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_concurrency_scores_higher_all_else_equal() {
        let weights = ScoringWeights::default();
        let mut cheap = StrategyPlan::new(StrategyClass::Aggressive, 10, 5.0, 0.1, 1000);
        let mut fewer = StrategyPlan::new(StrategyClass::Aggressive, 2, 5.0, 0.1, 1000);
        assert!(cheap.score_with(&weights) > fewer.score_with(&weights));
    }

    #[test]
    fn overdue_deadline_penalizes_score() {
        let weights = ScoringWeights::default();
        let mut on_time = StrategyPlan::new(StrategyClass::DeadlineFirst, 4, 1.0, 0.1, 5000);
        let mut late = StrategyPlan::new(StrategyClass::DeadlineFirst, 4, 1.0, 0.1, -5000);
        assert!(on_time.score_with(&weights) > late.score_with(&weights));
    }

    #[test]
    fn select_best_picks_highest_score() {
        let weights = ScoringWeights::default();
        let candidates = vec![
            StrategyPlan::new(StrategyClass::Conservative, 2, 10.0, 0.5, 0),
            StrategyPlan::new(StrategyClass::Aggressive, 8, 10.0, 0.5, 0),
        ];
        let best = select_best(candidates, &weights).unwrap();
        assert_eq!(best.class, StrategyClass::Aggressive);
    }

    #[test]
    fn select_best_ties_break_on_cost() {
        let weights = ScoringWeights {
            throughput_weight: 0.0,
            cost_weight: 1.0,
            risk_weight: 0.0,
            deadline_weight: 0.0,
        };
        let candidates = vec![
            StrategyPlan::new(StrategyClass::CostOptimized, 1, 5.0, 0.0, 0),
            StrategyPlan::new(StrategyClass::CostOptimized, 1, 2.0, 0.0, 0),
        ];
        let best = select_best(candidates, &weights).unwrap();
        assert_eq!(best.projected_cost, 2.0);
    }
}
