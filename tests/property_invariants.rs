//! Property tests for §8's structural invariants (I1, I3, I4) over
//! arbitrary DAG shapes and reservation histories, in the same style as
//! the dependency resolver's property suite this crate descends from:
//! generate a structure, exercise the real API, assert the invariant
//! rather than re-deriving the expected value.

use proptest::prelude::*;
use scanorc::application::DependencyResolver;
use scanorc::domain::models::{DependencyEdge, EdgeKind, ResourcePool, ResourceType, Stage, StageDag};
use uuid::Uuid;

proptest! {
    /// I4: adding edges one at a time, the resolver never accepts an edge
    /// that would close a cycle in the mandatory sub-graph — whatever
    /// edge set it does hold stays acyclic by construction.
    #[test]
    fn prop_resolver_never_holds_a_cycle(chain_len in 2usize..12) {
        let ids: Vec<Uuid> = (0..chain_len).map(|_| Uuid::new_v4()).collect();
        let mut resolver = DependencyResolver::new();

        // Linear chain of mandatory (Prerequisite) edges: always acyclic.
        for window in ids.windows(2) {
            let edge = DependencyEdge::new(window[0], window[1], EdgeKind::Prerequisite);
            prop_assert!(resolver.add_edge(edge).is_ok());
        }

        // Closing the chain into a cycle must be rejected, and rejection
        // must not mutate the held edge set.
        let closing = DependencyEdge::new(ids[chain_len - 1], ids[0], EdgeKind::Prerequisite);
        prop_assert!(resolver.add_edge(closing).is_err());
    }

    /// I1: for any acyclic stage DAG built from a linear-chain-plus-fork
    /// shape, the topological sort produced by `StageDag` contains every
    /// stage exactly once, so a wave executor counting `stages_done`
    /// against it can never exceed `stages_total`.
    #[test]
    fn prop_dag_topo_sort_covers_every_stage_once(size in 1usize..25) {
        let orchestration_id = Uuid::new_v4();
        let stage_ids: Vec<Uuid> = (0..size).map(|_| Uuid::new_v4()).collect();
        let mut stages = Vec::new();

        for (i, &id) in stage_ids.iter().enumerate() {
            let mut stage = Stage::new(orchestration_id, format!("stage-{i}"), "noop");
            stage.id = id;
            if i > 0 {
                // Every third stage forks off two back instead of one,
                // to exercise non-chain shapes without risking a cycle.
                let dep_index = if i >= 2 && i % 3 == 0 { i - 2 } else { i - 1 };
                stage.depends_on.push(stage_ids[dep_index]);
            }
            stages.push(stage);
        }

        let dag = StageDag::from_stages(&stages).expect("construction is acyclic by design");
        let order = dag.topological_sort();

        prop_assert_eq!(order.len(), size);
        let seen: std::collections::HashSet<Uuid> = order.iter().copied().collect();
        prop_assert_eq!(seen.len(), size);

        // Every dependency appears strictly before its dependent.
        let position: std::collections::HashMap<Uuid, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for stage in &stages {
            for dep in &stage.depends_on {
                prop_assert!(position[dep] < position[&stage.id]);
            }
        }
    }

    /// I3: no sequence of reserve/release calls against a single pool can
    /// ever push `reserved` above `total_capacity`, because every
    /// reservation in this property is first checked with `can_reserve`.
    #[test]
    fn prop_pool_never_overcommits(
        total in 1.0f64..1000.0,
        amounts in prop::collection::vec(0.0f64..200.0, 1..30),
    ) {
        let mut pool = ResourcePool::new(ResourceType::Cpu, total);

        for amount in amounts {
            if pool.can_reserve(amount) {
                pool.reserve(amount);
            }
            prop_assert!(pool.reserved <= pool.total_capacity + f64::EPSILON);
            prop_assert!(pool.available() >= 0.0);
        }
    }

    /// I3 (release side): releasing never drives `reserved` negative,
    /// regardless of how much is asked to be released or in what order
    /// reserve/release calls interleave.
    #[test]
    fn prop_pool_release_never_goes_negative(
        total in 1.0f64..1000.0,
        ops in prop::collection::vec((any::<bool>(), 0.0f64..200.0), 1..30),
    ) {
        let mut pool = ResourcePool::new(ResourceType::Cpu, total);

        for (is_reserve, amount) in ops {
            if is_reserve {
                if pool.can_reserve(amount) {
                    pool.reserve(amount);
                }
            } else {
                pool.release(amount);
            }
            prop_assert!(pool.reserved >= 0.0);
            prop_assert!(pool.reserved <= pool.total_capacity + f64::EPSILON);
        }
    }
}
