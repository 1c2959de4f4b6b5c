//! `SystemMetricsProbe` outbound port: host resource sampling consumed by
//! the Resource Broker and Monitor.

use async_trait::async_trait;

use crate::domain::models::ResourceType;

/// A single sampled reading for one resource type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsReading {
    pub resource_type: ResourceType,
    /// Fraction of total capacity currently in use, `0.0..=1.0`.
    pub utilization: f64,
}

/// Outbound port sampling live host/system resource usage. Implemented by
/// the `sysinfo`-backed adapter in production and a scripted fake in
/// tests.
#[async_trait]
pub trait SystemMetricsProbe: Send + Sync {
    async fn sample(&self) -> Vec<MetricsReading>;
}
