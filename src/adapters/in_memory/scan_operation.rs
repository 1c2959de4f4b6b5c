//! Scripted `ScanOperation` implementations for the CLI's demo mode and
//! integration tests: no real scan engine is invoked, just a sleep
//! proportional to the stage's estimated cost and a deterministic
//! success/failure outcome.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::StageFailure;
use crate::domain::ports::{ScanOperation, ScanOperationInput, ScanOperationOutput};

/// Always succeeds after a short delay proportional to the stage's
/// `estimated_cost`. Registered under whatever name the caller supplies so
/// one struct can stand in for `discover`, `profile`, `classify`, etc.
pub struct SimulatedScanOperation {
    name: String,
    millis_per_cost_unit: u64,
}

impl SimulatedScanOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            millis_per_cost_unit: 10,
        }
    }
}

#[async_trait]
impl ScanOperation for SimulatedScanOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: ScanOperationInput,
    ) -> Result<ScanOperationOutput, StageFailure> {
        let delay = (input.stage.estimated_cost.max(0.0) * self.millis_per_cost_unit as f64) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(ScanOperationOutput {
            actual_cost: input.stage.estimated_cost,
            detail: Some(format!("simulated {} completed", self.name)),
        })
    }
}

/// A registry of named `ScanOperation`s, built from the set of operation
/// names an orchestration's stages reference. The demo CLI populates this
/// with `SimulatedScanOperation`s; a production deployment would swap in
/// adapters that call the real scan engines.
pub fn simulated_registry(operation_names: &[&str]) -> HashMap<String, Arc<dyn ScanOperation>> {
    operation_names
        .iter()
        .map(|name| {
            let op: Arc<dyn ScanOperation> = Arc::new(SimulatedScanOperation::new(*name));
            ((*name).to_string(), op)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::domain::models::Stage;

    #[tokio::test]
    async fn simulated_operation_succeeds() {
        let op = SimulatedScanOperation::new("profile");
        let stage = Stage::new(Uuid::new_v4(), "profile-customers", "profile");
        let input = ScanOperationInput {
            orchestration_id: stage.orchestration_id,
            stage,
        };
        let output = op.execute(input).await.unwrap();
        assert_eq!(output.actual_cost, 0.0);
    }

    #[test]
    fn registry_builds_one_entry_per_name() {
        let registry = simulated_registry(&["discover", "profile"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains_key("discover"));
        assert!(registry.contains_key("profile"));
    }
}
