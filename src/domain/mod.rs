//! Domain layer for the scan orchestration core.
//!
//! Pure business logic and entities: no tokio, no sqlx, no I/O. Everything
//! here is framework-agnostic and deterministic.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{
    ConfigError, EventSinkError, OrchestrationError, OrchestrationResult, RepositoryError,
    RepositoryResult, StageFailure,
};
