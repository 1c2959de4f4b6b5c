//! Domain ports (interfaces) for the scan orchestration core.
//!
//! Outbound ports only — inbound ports (the four APIs of §5) live in
//! `application` as the methods exposed on their owning services.

pub mod event_sink;
pub mod metrics_probe;
pub mod repository;
pub mod scan_operation;

pub use event_sink::EventSink;
pub use metrics_probe::{MetricsReading, SystemMetricsProbe};
pub use repository::{OrchestrationFilter, Repository};
pub use scan_operation::{ScanOperation, ScanOperationInput, ScanOperationOutput};
