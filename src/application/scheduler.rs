//! Cross-orchestration stage scheduler (§4.2).
//!
//! Holds every stage that is currently ready to run, across every live
//! orchestration, and hands out the highest-priority one on demand.
//! Priority is recomputed on every pop rather than cached at enqueue time
//! because the aging term keeps climbing while an item waits — a heap
//! keyed on a stale score would let a long-waiting low-priority item sit
//! behind fresher high-priority arrivals forever.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::Orchestration;
use crate::services::PriorityCalculator;

/// One ready stage waiting for a worker slot.
#[derive(Debug, Clone)]
pub struct QueuedStage {
    pub orchestration_id: Uuid,
    pub stage_id: Uuid,
    pub dependency_depth: u32,
    pub queued_since: DateTime<Utc>,
}

/// Cross-orchestration ready-stage queue with priority-ordered dequeue.
pub struct Scheduler {
    calculator: PriorityCalculator,
    queue: RwLock<Vec<QueuedStage>>,
}

impl Scheduler {
    pub fn new(calculator: PriorityCalculator) -> Self {
        Self {
            calculator,
            queue: RwLock::new(Vec::new()),
        }
    }

    pub async fn enqueue(&self, orchestration_id: Uuid, stage_id: Uuid, dependency_depth: u32) {
        self.queue.write().await.push(QueuedStage {
            orchestration_id,
            stage_id,
            dependency_depth,
            queued_since: Utc::now(),
        });
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }

    /// Remove and return every stage queued for `orchestration_id`, used
    /// when an orchestration is cancelled or terminated mid-run.
    pub async fn drain_for_orchestration(&self, orchestration_id: Uuid) -> Vec<QueuedStage> {
        let mut queue = self.queue.write().await;
        let (drained, remaining): (Vec<_>, Vec<_>) = queue
            .drain(..)
            .partition(|item| item.orchestration_id == orchestration_id);
        *queue = remaining;
        drained
    }

    /// Select and remove the highest-priority ready stage, given the
    /// owning `Orchestration` for each queued item (the caller supplies a
    /// lookup since the scheduler itself holds no orchestration state).
    pub async fn pop_next(
        &self,
        lookup: impl Fn(Uuid) -> Option<Orchestration>,
    ) -> Option<QueuedStage> {
        let mut queue = self.queue.write().await;
        if queue.is_empty() {
            return None;
        }

        let mut best_index = None;
        let mut best_score = f64::NEG_INFINITY;
        for (index, item) in queue.iter().enumerate() {
            let Some(orchestration) = lookup(item.orchestration_id) else {
                continue;
            };
            let score = self.calculator.calculate(
                &orchestration,
                item.dependency_depth,
                Some(item.queued_since),
            );
            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }

        best_index.map(|index| queue.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OrchestrationType, Priority};
    use chrono::Duration;
    use std::collections::HashMap;

    fn orch(priority: Priority) -> Orchestration {
        let mut o = Orchestration::new("test", OrchestrationType::Discovery);
        o.priority = priority;
        o
    }

    #[tokio::test]
    async fn pop_next_picks_highest_scoring_item() {
        let scheduler = Scheduler::new(PriorityCalculator::new());
        let low = orch(Priority::Low);
        let critical = orch(Priority::Critical);

        let mut table = HashMap::new();
        table.insert(low.id, low.clone());
        table.insert(critical.id, critical.clone());

        scheduler.enqueue(low.id, Uuid::new_v4(), 0).await;
        scheduler.enqueue(critical.id, Uuid::new_v4(), 0).await;

        let picked = scheduler
            .pop_next(|id| table.get(&id).cloned())
            .await
            .unwrap();
        assert_eq!(picked.orchestration_id, critical.id);
        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn aged_low_priority_item_eventually_wins() {
        let scheduler = Scheduler::new(PriorityCalculator::new());
        let low = orch(Priority::Low);
        let critical = orch(Priority::Critical);

        let mut table = HashMap::new();
        table.insert(low.id, low.clone());
        table.insert(critical.id, critical.clone());

        {
            let mut queue = scheduler.queue.write().await;
            queue.push(QueuedStage {
                orchestration_id: low.id,
                stage_id: Uuid::new_v4(),
                dependency_depth: 0,
                queued_since: Utc::now() - Duration::hours(1),
            });
            queue.push(QueuedStage {
                orchestration_id: critical.id,
                stage_id: Uuid::new_v4(),
                dependency_depth: 0,
                queued_since: Utc::now(),
            });
        }

        let picked = scheduler
            .pop_next(|id| table.get(&id).cloned())
            .await
            .unwrap();
        assert_eq!(picked.orchestration_id, low.id);
    }

    #[tokio::test]
    async fn drain_for_orchestration_removes_only_its_stages() {
        let scheduler = Scheduler::new(PriorityCalculator::new());
        let keep = Uuid::new_v4();
        let drop_me = Uuid::new_v4();
        scheduler.enqueue(keep, Uuid::new_v4(), 0).await;
        scheduler.enqueue(drop_me, Uuid::new_v4(), 0).await;
        scheduler.enqueue(drop_me, Uuid::new_v4(), 0).await;

        let drained = scheduler.drain_for_orchestration(drop_me).await;
        assert_eq!(drained.len(), 2);
        assert_eq!(scheduler.len().await, 1);
    }
}
