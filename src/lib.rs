//! scanorc — enterprise scan orchestration core
//!
//! A DAG-based scan execution engine: orchestrations decompose into a
//! stage dependency graph, stages are dispatched wave by wave against a
//! typed resource broker, cross-orchestration dependencies and scheduling
//! priority are resolved independently of any one orchestration's actor,
//! and a monitor samples system state into periodic snapshots and
//! threshold-triggered alerts.
//!
//! Layering follows a hexagonal shape: `domain` is pure, framework-free
//! business logic; `application` holds every stateful service driving
//! that domain; `services` holds shared primitives (priority scoring,
//! circuit breaking, pub-sub) with no lifecycle of their own; `adapters`
//! implements the domain's outbound ports against SQLite and in-process
//! storage; `infrastructure` wires up cross-cutting concerns (config,
//! logging) that no layer above owns; `cli` is the operator-facing
//! surface over all of it.

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
