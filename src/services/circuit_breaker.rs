//! Circuit breaker pattern guarding reservations against a degraded
//! resource pool (§4.3's `PoolHealth`).
//!
//! A pool's health is not just a sampled reading: repeated reservation
//! failures against a pool trip its breaker independently of what the
//! metrics probe reports, so a pool that looks healthy on paper but keeps
//! failing reservations still gets taken out of rotation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::minutes(2),
            success_threshold: 2,
            failure_window: Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    timestamp: DateTime<Utc>,
}

/// One pool's circuit breaker, scoped by `pool_id`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub pool_id: Uuid,
    pub state: CircuitState,
    failures: Vec<FailureRecord>,
    half_open_successes: u32,
    opened_at: Option<DateTime<Utc>>,
    pub open_count: u32,
}

impl CircuitBreaker {
    pub fn new(pool_id: Uuid) -> Self {
        Self {
            pool_id,
            state: CircuitState::Closed,
            failures: Vec::new(),
            half_open_successes: 0,
            opened_at: None,
            open_count: 0,
        }
    }

    pub fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        self.failures.push(FailureRecord {
            timestamp: Utc::now(),
        });
        let cutoff = Utc::now() - config.failure_window;
        self.failures.retain(|f| f.timestamp > cutoff);

        if self.state == CircuitState::HalfOpen
            || (self.state == CircuitState::Closed
                && self.failures.len() as u32 >= config.failure_threshold)
        {
            self.open();
        }
    }

    pub fn record_success(&mut self, config: &CircuitBreakerConfig) {
        if self.state == CircuitState::HalfOpen {
            self.half_open_successes += 1;
            if self.half_open_successes >= config.success_threshold {
                self.close();
            }
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Utc::now());
        self.half_open_successes = 0;
        self.open_count += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.half_open_successes = 0;
        self.failures.clear();
    }

    /// Whether a reservation attempt should be let through right now.
    /// Transitions Open -> HalfOpen once the timeout elapses.
    pub fn allows(&mut self, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let Some(opened_at) = self.opened_at else {
                    return false;
                };
                if Utc::now() > opened_at + config.open_timeout {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn reset(&mut self) {
        self.close();
        self.open_count = 0;
    }
}
