//! Infrastructure layer.
//!
//! Cross-cutting concerns with no domain meaning of their own:
//! configuration loading and structured logging. Durable persistence
//! lives under `adapters::sqlite` instead, since it implements a domain
//! port rather than sitting beside it.

pub mod config;
pub mod logging;
