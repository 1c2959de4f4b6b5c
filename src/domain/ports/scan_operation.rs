//! `ScanOperation` outbound port: the actual work a stage invokes.
//!
//! The orchestration core never implements scan logic itself — it drives
//! `ScanOperation` implementations registered against a stage's
//! `operation` name and interprets only the `StageFailure` classification
//! of the result.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::StageFailure;
use crate::domain::models::Stage;

/// Input handed to a `ScanOperation` invocation.
#[derive(Debug, Clone)]
pub struct ScanOperationInput {
    pub orchestration_id: Uuid,
    pub stage: Stage,
}

/// Output of a successful `ScanOperation` invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOperationOutput {
    pub actual_cost: f64,
    pub detail: Option<String>,
}

/// One concrete unit of scan work, dispatched by name from a stage's
/// `operation` field.
#[async_trait]
pub trait ScanOperation: Send + Sync {
    /// Unique name this operation is registered under; must match the
    /// `operation` field of every `Stage` that invokes it.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        input: ScanOperationInput,
    ) -> Result<ScanOperationOutput, StageFailure>;
}
