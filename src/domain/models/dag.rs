//! DAG of stages within a single orchestration (§3, §4.1).

use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use uuid::Uuid;

use super::stage::Stage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("cycle detected involving stage {0}")]
    CycleDetected(Uuid),

    #[error("stage {stage} depends on missing stage {missing}")]
    MissingDependency { stage: Uuid, missing: Uuid },

    #[error("invalid DAG structure: {0}")]
    InvalidStructure(String),
}

/// One node's adjacency bookkeeping, derived once from a `Stage` list.
#[derive(Debug, Clone)]
struct DagNode {
    dependents: Vec<Uuid>,
}

/// The dependency graph over one orchestration's stages. Built once from
/// the stage list and kept alongside it; callers re-derive a `StageDag`
/// whenever stage dependencies change (they don't, once an orchestration
/// is planned).
#[derive(Debug, Clone)]
pub struct StageDag {
    nodes: HashMap<Uuid, DagNode>,
    depends_on: HashMap<Uuid, Vec<Uuid>>,
}

impl StageDag {
    /// Build a DAG from stages, validating that every dependency refers to
    /// a stage present in the set and that the graph is acyclic.
    pub fn from_stages(stages: &[Stage]) -> Result<Self, DagError> {
        let ids: HashSet<Uuid> = stages.iter().map(|s| s.id).collect();
        let mut nodes: HashMap<Uuid, DagNode> = stages
            .iter()
            .map(|s| (s.id, DagNode { dependents: Vec::new() }))
            .collect();
        let mut depends_on: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for stage in stages {
            for dep in &stage.depends_on {
                if !ids.contains(dep) {
                    return Err(DagError::MissingDependency {
                        stage: stage.id,
                        missing: *dep,
                    });
                }
                nodes.get_mut(dep).expect("dep id validated above").dependents.push(stage.id);
            }
            depends_on.insert(stage.id, stage.depends_on.clone());
        }

        let dag = Self { nodes, depends_on };
        if let Some(cyclic) = dag.find_cycle() {
            return Err(DagError::CycleDetected(cyclic));
        }
        Ok(dag)
    }

    fn find_cycle(&self) -> Option<Uuid> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<Uuid, Mark> =
            self.nodes.keys().map(|id| (*id, Mark::Unvisited)).collect();

        fn visit(
            id: Uuid,
            depends_on: &HashMap<Uuid, Vec<Uuid>>,
            marks: &mut HashMap<Uuid, Mark>,
        ) -> Option<Uuid> {
            match marks.get(&id) {
                Some(Mark::InProgress) => return Some(id),
                Some(Mark::Done) => return None,
                _ => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(deps) = depends_on.get(&id) {
                for dep in deps {
                    if let Some(cyclic) = visit(*dep, depends_on, marks) {
                        return Some(cyclic);
                    }
                }
            }
            marks.insert(id, Mark::Done);
            None
        }

        for id in self.nodes.keys().copied().collect::<Vec<_>>() {
            if marks[&id] == Mark::Unvisited {
                if let Some(cyclic) = visit(id, &self.depends_on, &mut marks) {
                    return Some(cyclic);
                }
            }
        }
        None
    }

    /// Kahn's algorithm; returns stages in an order where every dependency
    /// precedes its dependents. Already validated acyclic at construction.
    pub fn topological_sort(&self) -> Vec<Uuid> {
        let mut in_degree: HashMap<Uuid, usize> = self
            .nodes
            .keys()
            .map(|id| (*id, self.depends_on.get(id).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<Uuid> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(node) = self.nodes.get(&id) {
                for dependent in &node.dependents {
                    let deg = in_degree.get_mut(dependent).expect("dependent must exist");
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        order
    }

    /// Stages grouped into waves: wave `k` contains every stage whose
    /// dependencies all lie in waves `< k`. Stages within a wave have no
    /// ordering constraint between them and may run concurrently.
    pub fn execution_waves(&self) -> Vec<Vec<Uuid>> {
        let mut remaining: HashSet<Uuid> = self.nodes.keys().copied().collect();
        let mut completed: HashSet<Uuid> = HashSet::new();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let wave: Vec<Uuid> = remaining
                .iter()
                .filter(|id| {
                    self.depends_on
                        .get(*id)
                        .map_or(true, |deps| deps.iter().all(|d| completed.contains(d)))
                })
                .copied()
                .collect();

            if wave.is_empty() {
                break;
            }
            for id in &wave {
                remaining.remove(id);
                completed.insert(*id);
            }
            waves.push(wave);
        }
        waves
    }

    /// The ready set given a set of already-completed stage ids: every
    /// stage whose dependencies are all satisfied and is not itself
    /// already completed.
    pub fn ready_set(&self, completed: &HashSet<Uuid>) -> Vec<Uuid> {
        self.nodes
            .keys()
            .filter(|id| !completed.contains(*id))
            .filter(|id| {
                self.depends_on
                    .get(*id)
                    .map_or(true, |deps| deps.iter().all(|d| completed.contains(d)))
            })
            .copied()
            .collect()
    }

    /// Longest dependency chain by stage count, used as a priority tie-
    /// breaker (deeper stages get scheduled first within a wave).
    pub fn critical_path(&self) -> Vec<Uuid> {
        let order = self.topological_sort();
        let mut depth: HashMap<Uuid, usize> = HashMap::new();
        let mut best_pred: HashMap<Uuid, Uuid> = HashMap::new();

        for id in &order {
            let d = self
                .depends_on
                .get(id)
                .into_iter()
                .flatten()
                .map(|dep| depth.get(dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(*id, d);
            if let Some(deepest_dep) = self
                .depends_on
                .get(id)
                .into_iter()
                .flatten()
                .max_by_key(|dep| depth.get(*dep).copied().unwrap_or(0))
            {
                best_pred.insert(*id, *deepest_dep);
            }
        }

        let Some(&tail) = depth.iter().max_by_key(|(_, d)| **d).map(|(id, _)| id) else {
            return Vec::new();
        };
        let mut path = vec![tail];
        let mut cur = tail;
        while let Some(pred) = best_pred.get(&cur) {
            path.push(*pred);
            cur = *pred;
        }
        path.reverse();
        path
    }

    /// Depth of a stage in the dependency graph (0 for roots), used by the
    /// priority calculator's depth term.
    pub fn depth_of(&self, id: Uuid) -> usize {
        self.depends_on
            .get(&id)
            .into_iter()
            .flatten()
            .map(|dep| self.depth_of(*dep) + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DagStats {
        DagStats {
            stage_count: self.nodes.len(),
            edge_count: self.depends_on.values().map(Vec::len).sum(),
            wave_count: self.execution_waves().len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DagStats {
    pub stage_count: usize,
    pub edge_count: usize,
    pub wave_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_with_deps(id: Uuid, orchestration: Uuid, deps: Vec<Uuid>) -> Stage {
        let mut s = Stage::new(orchestration, "s", "op");
        s.id = id;
        s.depends_on = deps;
        s
    }

    #[test]
    fn linear_chain_topological_order() {
        let o = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![
            stage_with_deps(a, o, vec![]),
            stage_with_deps(b, o, vec![a]),
            stage_with_deps(c, o, vec![b]),
        ];
        let dag = StageDag::from_stages(&stages).unwrap();
        let order = dag.topological_sort();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn cycle_is_detected() {
        let o = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![stage_with_deps(a, o, vec![b]), stage_with_deps(b, o, vec![a])];
        let err = StageDag::from_stages(&stages).unwrap_err();
        assert!(matches!(err, DagError::CycleDetected(_)));
    }

    #[test]
    fn missing_dependency_rejected() {
        let o = Uuid::new_v4();
        let a = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let stages = vec![stage_with_deps(a, o, vec![missing])];
        let err = StageDag::from_stages(&stages).unwrap_err();
        assert_eq!(
            err,
            DagError::MissingDependency {
                stage: a,
                missing
            }
        );
    }

    #[test]
    fn diamond_execution_waves() {
        let o = Uuid::new_v4();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![
            stage_with_deps(a, o, vec![]),
            stage_with_deps(b, o, vec![a]),
            stage_with_deps(c, o, vec![a]),
            stage_with_deps(d, o, vec![b, c]),
        ];
        let dag = StageDag::from_stages(&stages).unwrap();
        let waves = dag.execution_waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec![a]);
        let mut wave1 = waves[1].clone();
        wave1.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(wave1, expected);
        assert_eq!(waves[2], vec![d]);
    }

    #[test]
    fn ready_set_respects_completion() {
        let o = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![stage_with_deps(a, o, vec![]), stage_with_deps(b, o, vec![a])];
        let dag = StageDag::from_stages(&stages).unwrap();
        let empty = HashSet::new();
        assert_eq!(dag.ready_set(&empty), vec![a]);
        let mut done = HashSet::new();
        done.insert(a);
        assert_eq!(dag.ready_set(&done), vec![b]);
    }

    #[test]
    fn critical_path_follows_deepest_chain() {
        let o = Uuid::new_v4();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![
            stage_with_deps(a, o, vec![]),
            stage_with_deps(b, o, vec![a]),
            stage_with_deps(c, o, vec![b]),
            stage_with_deps(d, o, vec![a]),
        ];
        let dag = StageDag::from_stages(&stages).unwrap();
        let path = dag.critical_path();
        assert_eq!(path, vec![a, b, c]);
    }

    #[test]
    fn stats_reports_counts() {
        let o = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let stages = vec![stage_with_deps(a, o, vec![]), stage_with_deps(b, o, vec![a])];
        let dag = StageDag::from_stages(&stages).unwrap();
        let stats = dag.stats();
        assert_eq!(stats.stage_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.wave_count, 2);
    }
}
