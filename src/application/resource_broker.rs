//! Resource Broker (§4.3): typed pool bookkeeping, reservations,
//! auto-scale, preemption, and budget enforcement.
//!
//! One `ResourceBroker` instance owns every pool. Unlike the orchestrator
//! actors, the broker is accessed through an internal `RwLock` rather than
//! a mailbox: reservation checks are short, CPU-bound bookkeeping with no
//! `.await` boundary that would need a mailbox's serialization guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{PoolHealth, Reservation, ResourcePool, ResourceType};
use crate::domain::ports::SystemMetricsProbe;
use crate::domain::{OrchestrationError, OrchestrationResult};
use crate::services::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

struct PoolEntry {
    pool: ResourcePool,
    breaker: CircuitBreaker,
}

/// Point-in-time view of one registered pool, for reporting consumers
/// that should not reach into the broker's internal lock.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub resource_type: ResourceType,
    pub total_capacity: f64,
    pub reserved: f64,
    pub available: f64,
    pub utilization: f64,
    pub health: PoolHealth,
    pub circuit_state: CircuitState,
}

/// Owns every typed resource pool and the reservations made against them.
pub struct ResourceBroker {
    pools: RwLock<HashMap<ResourceType, PoolEntry>>,
    reservations: RwLock<HashMap<Uuid, Reservation>>,
    breaker_config: CircuitBreakerConfig,
    probe: Arc<dyn SystemMetricsProbe>,
}

impl ResourceBroker {
    pub fn new(probe: Arc<dyn SystemMetricsProbe>) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            breaker_config: CircuitBreakerConfig::default(),
            probe,
        }
    }

    pub async fn register_pool(&self, pool: ResourcePool) {
        let resource_type = pool.resource_type;
        let breaker = CircuitBreaker::new(pool.id);
        self.pools
            .write()
            .await
            .insert(resource_type, PoolEntry { pool, breaker });
    }

    /// Attempt to satisfy a reservation across the requested entries,
    /// auto-scaling pools that are short of capacity before giving up.
    /// All-or-nothing: if any entry cannot be satisfied the reservation is
    /// not made against any pool.
    pub async fn reserve(
        &self,
        orchestration_id: Uuid,
        entries: HashMap<ResourceType, f64>,
    ) -> OrchestrationResult<Reservation> {
        let mut pools = self.pools.write().await;

        for (resource_type, amount) in &entries {
            let entry = pools.get_mut(resource_type).ok_or_else(|| {
                OrchestrationError::ResourceDenied {
                    orchestration_id,
                    reason: format!("no pool registered for {resource_type:?}"),
                }
            })?;

            if !entry.breaker.allows(&self.breaker_config) {
                return Err(OrchestrationError::ResourceDenied {
                    orchestration_id,
                    reason: format!("pool {resource_type:?} circuit open"),
                });
            }

            if !entry.pool.can_reserve(*amount) {
                if !entry.pool.scale_up() || !entry.pool.can_reserve(*amount) {
                    entry.breaker.record_failure(&self.breaker_config);
                    entry.pool.consecutive_denials += 1;
                    if entry.pool.consecutive_denials >= 3 {
                        entry.pool.health = PoolHealth::Degraded;
                    }
                    return Err(OrchestrationError::ResourceDenied {
                        orchestration_id,
                        reason: format!(
                            "pool {resource_type:?} cannot satisfy reservation of {amount}"
                        ),
                    });
                }
            }
        }

        for (resource_type, amount) in &entries {
            let entry = pools.get_mut(resource_type).expect("checked above");
            entry.pool.reserve(*amount);
            entry.breaker.record_success(&self.breaker_config);
            entry.pool.consecutive_denials = 0;
        }

        let reservation = Reservation::new(orchestration_id, entries);
        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation.clone());

        info!(
            orchestration_id = %orchestration_id,
            reservation_id = %reservation.id,
            "reservation granted"
        );
        Ok(reservation)
    }

    pub async fn release(&self, reservation_id: Uuid) {
        let Some(reservation) = self.reservations.write().await.remove(&reservation_id) else {
            return;
        };
        let mut pools = self.pools.write().await;
        for (resource_type, amount) in reservation.entries {
            if let Some(entry) = pools.get_mut(&resource_type) {
                entry.pool.release(amount);
            }
        }
    }

    /// Forcibly release a reservation to make room for a higher-priority
    /// claim, marking it preempted rather than cleanly released.
    pub async fn preempt(&self, reservation_id: Uuid) -> bool {
        let mut reservations = self.reservations.write().await;
        let Some(reservation) = reservations.get_mut(&reservation_id) else {
            return false;
        };
        reservation.preempted = true;
        let entries = reservation.entries.clone();
        drop(reservations);

        let mut pools = self.pools.write().await;
        for (resource_type, amount) in entries {
            if let Some(entry) = pools.get_mut(&resource_type) {
                entry.pool.release(amount);
            }
        }
        warn!(reservation_id = %reservation_id, "reservation preempted");
        true
    }

    /// Refresh every pool's utilization-derived health from a fresh probe
    /// sample, scaling down pools that have fallen well under their low
    /// watermark.
    pub async fn refresh_from_probe(&self) {
        let readings = self.probe.sample().await;
        let mut pools = self.pools.write().await;
        for reading in readings {
            if let Some(entry) = pools.get_mut(&reading.resource_type) {
                if reading.utilization < entry.pool.scale_policy.low_watermark {
                    entry.pool.scale_down();
                }
                if matches!(entry.breaker.state, crate::services::CircuitState::Closed) {
                    entry.pool.health = PoolHealth::Healthy;
                }
            }
        }
    }

    pub async fn pool_health(&self, resource_type: ResourceType) -> Option<PoolHealth> {
        self.pools.read().await.get(&resource_type).map(|e| e.pool.health)
    }

    pub async fn utilization(&self, resource_type: ResourceType) -> Option<f64> {
        self.pools
            .read()
            .await
            .get(&resource_type)
            .map(|e| e.pool.utilization())
    }

    /// A point-in-time view of every registered pool, for the `resource
    /// query`/`resource health` CLI surface.
    pub async fn snapshot_all(&self) -> Vec<PoolSnapshot> {
        self.pools
            .read()
            .await
            .values()
            .map(|entry| PoolSnapshot {
                resource_type: entry.pool.resource_type,
                total_capacity: entry.pool.total_capacity,
                reserved: entry.pool.reserved,
                available: entry.pool.available(),
                utilization: entry.pool.utilization(),
                health: entry.pool.health,
                circuit_state: entry.breaker.state,
            })
            .collect()
    }

    /// System-wide health: the worst of any registered pool's health,
    /// degraded further to `Unavailable` when the scheduler's ready-queue
    /// is saturated (back-pressure engaged) even if every pool itself
    /// reports healthy — callers of `ResourceAPI::Health` care about
    /// whether new work can actually be admitted, not just pool state.
    pub async fn system_health(&self, scheduler_saturated: bool) -> PoolHealth {
        let worst = self
            .pools
            .read()
            .await
            .values()
            .map(|entry| entry.pool.health)
            .max_by_key(|h| match h {
                PoolHealth::Healthy => 0,
                PoolHealth::Degraded => 1,
                PoolHealth::Unavailable => 2,
            })
            .unwrap_or(PoolHealth::Healthy);

        if scheduler_saturated && worst == PoolHealth::Healthy {
            PoolHealth::Degraded
        } else {
            worst
        }
    }

    /// Scale every pool toward its watermarks: up when utilization is at
    /// or above `high_watermark`, down when at or below `low_watermark`.
    /// Returns the resource types whose capacity actually changed.
    pub async fn optimize(&self) -> Vec<ResourceType> {
        let mut changed = Vec::new();
        let mut pools = self.pools.write().await;
        for (resource_type, entry) in pools.iter_mut() {
            let utilization = entry.pool.utilization();
            let did_change = if utilization >= entry.pool.scale_policy.high_watermark {
                entry.pool.scale_up()
            } else if utilization <= entry.pool.scale_policy.low_watermark {
                entry.pool.scale_down()
            } else {
                false
            };
            if did_change {
                changed.push(*resource_type);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::domain::ports::MetricsReading;

    struct NoopProbe;

    #[async_trait]
    impl SystemMetricsProbe for NoopProbe {
        async fn sample(&self) -> Vec<MetricsReading> {
            Vec::new()
        }
    }

    fn broker() -> ResourceBroker {
        ResourceBroker::new(Arc::new(NoopProbe))
    }

    #[tokio::test]
    async fn reserve_succeeds_within_capacity() {
        let broker = broker();
        broker.register_pool(ResourcePool::new(ResourceType::Cpu, 10.0)).await;

        let mut entries = HashMap::new();
        entries.insert(ResourceType::Cpu, 4.0);
        let reservation = broker.reserve(Uuid::new_v4(), entries).await.unwrap();

        assert_eq!(broker.utilization(ResourceType::Cpu).await, Some(0.4));
        broker.release(reservation.id).await;
        assert_eq!(broker.utilization(ResourceType::Cpu).await, Some(0.0));
    }

    #[tokio::test]
    async fn reserve_denied_without_registered_pool() {
        let broker = broker();
        let mut entries = HashMap::new();
        entries.insert(ResourceType::Cpu, 1.0);
        assert!(broker.reserve(Uuid::new_v4(), entries).await.is_err());
    }

    #[tokio::test]
    async fn repeated_denials_degrade_pool_health() {
        let broker = broker();
        broker.register_pool(ResourcePool::new(ResourceType::Cpu, 1.0)).await;

        for _ in 0..3 {
            let mut entries = HashMap::new();
            entries.insert(ResourceType::Cpu, 5.0);
            let _ = broker.reserve(Uuid::new_v4(), entries).await;
        }

        assert_eq!(broker.pool_health(ResourceType::Cpu).await, Some(PoolHealth::Degraded));
    }

    #[tokio::test]
    async fn system_health_is_worst_of_pools() {
        let broker = broker();
        broker.register_pool(ResourcePool::new(ResourceType::Cpu, 1.0)).await;
        broker.register_pool(ResourcePool::new(ResourceType::Memory, 10.0)).await;
        assert_eq!(broker.system_health(false).await, PoolHealth::Healthy);

        for _ in 0..3 {
            let mut entries = HashMap::new();
            entries.insert(ResourceType::Cpu, 5.0);
            let _ = broker.reserve(Uuid::new_v4(), entries).await;
        }
        assert_eq!(broker.system_health(false).await, PoolHealth::Degraded);
    }

    #[tokio::test]
    async fn system_health_degrades_on_scheduler_saturation_alone() {
        let broker = broker();
        broker.register_pool(ResourcePool::new(ResourceType::Cpu, 10.0)).await;
        assert_eq!(broker.system_health(true).await, PoolHealth::Degraded);
    }

    #[tokio::test]
    async fn preempt_releases_reserved_capacity() {
        let broker = broker();
        broker.register_pool(ResourcePool::new(ResourceType::Cpu, 10.0)).await;
        let mut entries = HashMap::new();
        entries.insert(ResourceType::Cpu, 6.0);
        let reservation = broker.reserve(Uuid::new_v4(), entries).await.unwrap();

        assert!(broker.preempt(reservation.id).await);
        assert_eq!(broker.utilization(ResourceType::Cpu).await, Some(0.0));
    }
}
