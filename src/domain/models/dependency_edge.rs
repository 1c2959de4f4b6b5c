//! Inter-orchestration dependency edges (§4.4).
//!
//! Unlike stage dependencies, which are intra-orchestration and fixed at
//! planning time, dependency edges link two distinct orchestrations and
//! can be added, overridden, or removed while both sides are live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of wait an edge enforces on its dependent orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The dependent cannot leave `queued` until the source completes.
    Prerequisite,
    /// Prevents the source from starting while the dependent is running;
    /// modeled here with the same wait mechanics as `Prerequisite` since
    /// both resolve to "hold until the other side clears."
    Blocking,
    /// Evaluated against a predicate at dispatch time. No predicate
    /// engine is wired up yet, so a conditional edge is always satisfied
    /// vacuously and never blocks — see SPEC_FULL.md open questions.
    Conditional,
    /// Advisory; never blocks scheduling.
    Parallel,
    /// Orders two orchestrations without the override/timeout machinery
    /// `Prerequisite` carries.
    Sequential,
    /// Never blocks, regardless of status.
    Optional,
}

impl EdgeKind {
    /// Whether this kind participates in the mandatory-subgraph cycle
    /// check and can hold a dependent in `Waiting`.
    pub fn is_blocking(self) -> bool {
        matches!(self, EdgeKind::Prerequisite | EdgeKind::Blocking | EdgeKind::Sequential)
    }
}

/// Current status of a single dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Waiting,
    Satisfied,
    Overridden,
    TimedOut,
}

/// A directed edge: `dependent` may not proceed past scheduling until
/// `source` satisfies it (per `kind`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: Uuid,
    pub source: Uuid,
    pub dependent: Uuid,
    pub kind: EdgeKind,
    pub status: EdgeStatus,
    pub wait_timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub overridden_by: Option<String>,
}

impl DependencyEdge {
    pub fn new(source: Uuid, dependent: Uuid, kind: EdgeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            dependent,
            kind,
            status: EdgeStatus::Waiting,
            wait_timeout_ms: None,
            created_at: Utc::now(),
            overridden_by: None,
        }
    }

    /// Whether this edge currently blocks its dependent from scheduling.
    pub fn blocks(&self) -> bool {
        self.kind.is_blocking() && matches!(self.status, EdgeStatus::Waiting)
    }

    pub fn mark_satisfied(&mut self) {
        self.status = EdgeStatus::Satisfied;
    }

    pub fn mark_timed_out(&mut self) {
        self.status = EdgeStatus::TimedOut;
    }

    pub fn override_with(&mut self, operator: impl Into<String>) {
        self.status = EdgeStatus::Overridden;
        self.overridden_by = Some(operator.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisite_edge_blocks_until_satisfied() {
        let mut edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4(), EdgeKind::Prerequisite);
        assert!(edge.blocks());
        edge.mark_satisfied();
        assert!(!edge.blocks());
    }

    #[test]
    fn optional_edge_never_blocks() {
        let edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4(), EdgeKind::Optional);
        assert!(!edge.blocks());
    }

    #[test]
    fn parallel_edge_never_blocks() {
        let edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4(), EdgeKind::Parallel);
        assert!(!edge.blocks());
    }

    #[test]
    fn conditional_edge_is_vacuously_satisfied() {
        let edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4(), EdgeKind::Conditional);
        assert!(!edge.blocks());
    }

    #[test]
    fn override_clears_block_and_records_operator() {
        let mut edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4(), EdgeKind::Sequential);
        edge.override_with("oncall");
        assert!(!edge.blocks());
        assert_eq!(edge.overridden_by.as_deref(), Some("oncall"));
    }
}
