//! Engine configuration (§6), loaded via the figment precedence chain in
//! `infrastructure::config::loader`.

use serde::{Deserialize, Serialize};

/// Root configuration for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Maximum number of orchestrations the scheduler will run
    /// concurrently (1-10000).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the scheduler's ready-stage queue.
    #[serde(default = "default_queue_capacity")]
    pub scheduler_queue_capacity: usize,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub pool_defaults: PoolDefaultsConfig,

    /// How often the Monitor samples a new snapshot.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Capacity of the Monitor's in-process snapshot history ring buffer.
    #[serde(default = "default_snapshot_ring_size")]
    pub snapshot_ring_size: usize,

    /// Grace period before a cancellation escalates to a forced
    /// termination.
    #[serde(default = "default_cancellation_grace_ms")]
    pub cancellation_grace_ms: u64,

    /// How long an orchestration may sit in `pending_approval` before the
    /// approval is treated as timed out and the orchestration fails.
    #[serde(default = "default_approval_timeout_ms")]
    pub approval_timeout_ms: u64,
}

const fn default_worker_count() -> usize {
    16
}

const fn default_queue_capacity() -> usize {
    4096
}

const fn default_snapshot_interval_ms() -> u64 {
    5000
}

const fn default_snapshot_ring_size() -> usize {
    1000
}

const fn default_cancellation_grace_ms() -> u64 {
    30_000
}

const fn default_approval_timeout_ms() -> u64 {
    3_600_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            scheduler_queue_capacity: default_queue_capacity(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            retry: RetryConfig::default(),
            pool_defaults: PoolDefaultsConfig::default(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            snapshot_ring_size: default_snapshot_ring_size(),
            cancellation_grace_ms: default_cancellation_grace_ms(),
            approval_timeout_ms: default_approval_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Validate cross-field invariants not expressible through serde
    /// defaults alone.
    pub fn validate(&self) -> Result<(), crate::domain::ConfigError> {
        use crate::domain::ConfigError;

        if self.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.worker_count));
        }
        if self.scheduler_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(self.scheduler_queue_capacity));
        }
        if self.retry.initial_backoff_ms >= self.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms,
            ));
        }
        if self.pool_defaults.total_capacity <= 0.0 {
            return Err(ConfigError::InvalidPoolDefaults(
                "total_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `SQLite` durable repository configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".scanorc/scanorc.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
        }
    }
}

/// Default stage retry policy, overridable per-stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound of the random jitter added on top of the exponential
    /// delay, to spread out retries that would otherwise fire in lockstep.
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_jitter_max_ms() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

/// Default capacity and scale policy applied to pools created without
/// explicit overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolDefaultsConfig {
    #[serde(default = "default_total_capacity")]
    pub total_capacity: f64,

    #[serde(default = "default_high_watermark")]
    pub high_watermark: f64,

    #[serde(default = "default_low_watermark")]
    pub low_watermark: f64,

    #[serde(default)]
    pub auto_scale: bool,
}

const fn default_total_capacity() -> f64 {
    100.0
}

const fn default_high_watermark() -> f64 {
    0.85
}

const fn default_low_watermark() -> f64 {
    0.25
}

impl Default for PoolDefaultsConfig {
    fn default() -> Self {
        Self {
            total_capacity: default_total_capacity(),
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            auto_scale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_worker_count_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.worker_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_base_must_be_below_cap() {
        let mut cfg = EngineConfig::default();
        cfg.retry.initial_backoff_ms = cfg.retry.max_backoff_ms;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_pool_capacity_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.pool_defaults.total_capacity = 0.0;
        assert!(cfg.validate().is_err());
    }
}
