//! Adapters implementing the domain's outbound ports.

pub mod in_memory;
pub mod repository_sink;
pub mod sqlite;

pub use repository_sink::RepositoryEventSink;
