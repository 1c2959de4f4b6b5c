//! Resource pool bookkeeping domain model (§4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A class of resource the broker tracks capacity for (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Cpu,
    Memory,
    NetworkBandwidth,
    ConcurrentConnections,
    StorageIops,
    /// Worker execution slots; the pool S4/S5 denial and preemption
    /// scenarios reserve against.
    Workers,
    ApiCalls,
    ComputeInstances,
    ClassifierInstances,
    MlModels,
    Storage,
}

/// How a pool grows or shrinks its capacity in response to demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalePolicy {
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub scale_increment: f64,
    /// Utilization ratio above which the broker scales up.
    pub high_watermark: f64,
    /// Utilization ratio below which the broker scales down.
    pub low_watermark: f64,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            min_capacity: 1.0,
            max_capacity: 1.0,
            scale_increment: 0.0,
            high_watermark: 0.85,
            low_watermark: 0.25,
        }
    }
}

impl ScalePolicy {
    pub fn is_auto_scaling(&self) -> bool {
        self.max_capacity > self.min_capacity && self.scale_increment > 0.0
    }
}

/// Health of a resource pool, backing the circuit-breaker-style guard on
/// reservations against a degraded pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolHealth {
    Healthy,
    Degraded,
    Unavailable,
}

/// One typed pool of a resource, with current capacity and reservations
/// tracked against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub total_capacity: f64,
    pub reserved: f64,
    pub in_use: f64,
    pub scale_policy: ScalePolicy,
    pub health: PoolHealth,
    pub consecutive_denials: u32,
}

impl ResourcePool {
    pub fn new(resource_type: ResourceType, total_capacity: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_type,
            total_capacity,
            reserved: 0.0,
            in_use: 0.0,
            scale_policy: ScalePolicy::default(),
            health: PoolHealth::Healthy,
            consecutive_denials: 0,
        }
    }

    pub fn available(&self) -> f64 {
        (self.total_capacity - self.reserved).max(0.0)
    }

    pub fn utilization(&self) -> f64 {
        if self.total_capacity <= 0.0 {
            return 0.0;
        }
        (self.reserved / self.total_capacity).min(1.0)
    }

    /// Whether a reservation of `amount` fits without scaling.
    pub fn can_reserve(&self, amount: f64) -> bool {
        matches!(self.health, PoolHealth::Healthy) && self.available() >= amount
    }

    pub fn reserve(&mut self, amount: f64) {
        self.reserved += amount;
    }

    pub fn release(&mut self, amount: f64) {
        self.reserved = (self.reserved - amount).max(0.0);
    }

    /// Grow capacity by one scale increment, bounded by `max_capacity`.
    /// Returns whether capacity actually changed.
    pub fn scale_up(&mut self) -> bool {
        if !self.scale_policy.is_auto_scaling() {
            return false;
        }
        let next = (self.total_capacity + self.scale_policy.scale_increment)
            .min(self.scale_policy.max_capacity);
        let changed = next > self.total_capacity;
        self.total_capacity = next;
        changed
    }

    pub fn scale_down(&mut self) -> bool {
        if !self.scale_policy.is_auto_scaling() {
            return false;
        }
        let next = (self.total_capacity - self.scale_policy.scale_increment)
            .max(self.scale_policy.min_capacity);
        let changed = next < self.total_capacity;
        self.total_capacity = next;
        changed
    }
}

/// One orchestration's claim against one or more pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub orchestration_id: Uuid,
    pub entries: HashMap<ResourceType, f64>,
    pub created_at: DateTime<Utc>,
    pub preempted: bool,
}

impl Reservation {
    pub fn new(orchestration_id: Uuid, entries: HashMap<ResourceType, f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            orchestration_id,
            entries,
            created_at: Utc::now(),
            preempted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reserve_and_release_round_trips() {
        let mut pool = ResourcePool::new(ResourceType::Cpu, 10.0);
        pool.reserve(4.0);
        assert_eq!(pool.available(), 6.0);
        pool.release(4.0);
        assert_eq!(pool.available(), 10.0);
    }

    #[test]
    fn release_never_goes_negative() {
        let mut pool = ResourcePool::new(ResourceType::Cpu, 10.0);
        pool.release(5.0);
        assert_eq!(pool.reserved, 0.0);
    }

    #[test]
    fn degraded_pool_refuses_reservations() {
        let mut pool = ResourcePool::new(ResourceType::Cpu, 10.0);
        pool.health = PoolHealth::Degraded;
        assert!(!pool.can_reserve(1.0));
    }

    #[test]
    fn scale_up_respects_max_capacity() {
        let mut pool = ResourcePool::new(ResourceType::Cpu, 10.0);
        pool.scale_policy = ScalePolicy {
            min_capacity: 10.0,
            max_capacity: 12.0,
            scale_increment: 5.0,
            ..Default::default()
        };
        assert!(pool.scale_up());
        assert_eq!(pool.total_capacity, 12.0);
        assert!(!pool.scale_up());
    }

    #[test]
    fn non_auto_scaling_pool_does_not_scale() {
        let mut pool = ResourcePool::new(ResourceType::Cpu, 10.0);
        assert!(!pool.scale_up());
        assert_eq!(pool.total_capacity, 10.0);
    }
}
