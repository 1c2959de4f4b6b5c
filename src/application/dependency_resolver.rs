//! Inter-orchestration dependency graph (§4.4).
//!
//! Edges here link whole orchestrations, not stages within one — they can
//! be added and removed while both sides are live, so unlike the
//! intra-orchestration `StageDag` (fixed at planning time and checked with
//! a simple DFS), this graph is checked with Tarjan's strongly-connected-
//! components algorithm: it must re-verify acyclicity cheaply every time a
//! caller proposes a new edge into an already-large graph.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::models::{DependencyEdge, EdgeKind};

/// Tarjan's algorithm state, run fresh on each `has_cycle` check. The
/// resolver favors correctness-on-every-call over incremental bookkeeping
/// since edges change far less often than stages tick.
struct Tarjan {
    index: HashMap<Uuid, usize>,
    lowlink: HashMap<Uuid, usize>,
    on_stack: HashSet<Uuid>,
    stack: Vec<Uuid>,
    next_index: usize,
    sccs: Vec<Vec<Uuid>>,
}

impl Tarjan {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            lowlink: HashMap::new(),
            on_stack: HashSet::new(),
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn strongconnect(&mut self, node: Uuid, adjacency: &HashMap<Uuid, Vec<Uuid>>) {
        self.index.insert(node, self.next_index);
        self.lowlink.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        if let Some(neighbors) = adjacency.get(&node) {
            for &neighbor in neighbors {
                if !self.index.contains_key(&neighbor) {
                    self.strongconnect(neighbor, adjacency);
                    let neighbor_low = self.lowlink[&neighbor];
                    let node_low = self.lowlink[&node];
                    self.lowlink.insert(node, node_low.min(neighbor_low));
                } else if self.on_stack.contains(&neighbor) {
                    let neighbor_index = self.index[&neighbor];
                    let node_low = self.lowlink[&node];
                    self.lowlink.insert(node, node_low.min(neighbor_index));
                }
            }
        }

        if self.lowlink[&node] == self.index[&node] {
            let mut component = Vec::new();
            loop {
                let member = self.stack.pop().expect("node must be on stack");
                self.on_stack.remove(&member);
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.sccs.push(component);
        }
    }
}

/// Resolves inter-orchestration dependency edges: cycle detection,
/// wait-set computation, and override bookkeeping.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    edges: Vec<DependencyEdge>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: DependencyEdge) -> Result<(), String> {
        let mut adjacency = self.adjacency();
        adjacency.entry(edge.source).or_default().push(edge.dependent);

        if let Some(cyclic) = Self::find_nontrivial_scc(&adjacency) {
            return Err(format!(
                "adding edge {} -> {} would create a cycle through {:?}",
                edge.source, edge.dependent, cyclic
            ));
        }

        self.edges.push(edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, edge_id: Uuid) {
        self.edges.retain(|e| e.id != edge_id);
    }

    pub fn override_edge(&mut self, edge_id: Uuid, operator: impl Into<String>) -> bool {
        if let Some(edge) = self.edges.iter_mut().find(|e| e.id == edge_id) {
            edge.override_with(operator);
            true
        } else {
            false
        }
    }

    /// Every edge blocking `dependent` from scheduling right now.
    pub fn blocking_edges(&self, dependent: Uuid) -> Vec<&DependencyEdge> {
        self.edges
            .iter()
            .filter(|e| e.dependent == dependent && e.blocks())
            .collect()
    }

    pub fn is_ready(&self, orchestration_id: Uuid) -> bool {
        self.blocking_edges(orchestration_id).is_empty()
    }

    fn adjacency(&self) -> HashMap<Uuid, Vec<Uuid>> {
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in &self.edges {
            if edge.kind.is_blocking() {
                adjacency.entry(edge.source).or_default().push(edge.dependent);
            }
        }
        adjacency
    }

    /// Returns the member list of the first strongly-connected component
    /// with more than one node (a real cycle; every acyclic graph's SCCs
    /// are all singletons).
    fn find_nontrivial_scc(adjacency: &HashMap<Uuid, Vec<Uuid>>) -> Option<Vec<Uuid>> {
        let mut nodes: HashSet<Uuid> = HashSet::new();
        for (source, targets) in adjacency {
            nodes.insert(*source);
            nodes.extend(targets.iter().copied());
        }

        let mut tarjan = Tarjan::new();
        for node in nodes {
            if !tarjan.index.contains_key(&node) {
                tarjan.strongconnect(node, adjacency);
            }
        }

        tarjan.sccs.into_iter().find(|scc| scc.len() > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acyclic_edges_accepted() {
        let mut resolver = DependencyResolver::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(resolver.add_edge(DependencyEdge::new(a, b, EdgeKind::Prerequisite)).is_ok());
        assert!(resolver.add_edge(DependencyEdge::new(b, c, EdgeKind::Prerequisite)).is_ok());
    }

    #[test]
    fn cyclic_edge_rejected() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        resolver.add_edge(DependencyEdge::new(a, b, EdgeKind::Prerequisite)).unwrap();
        assert!(resolver.add_edge(DependencyEdge::new(b, a, EdgeKind::Prerequisite)).is_err());
    }

    #[test]
    fn optional_edges_never_block_readiness() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        resolver.add_edge(DependencyEdge::new(a, b, EdgeKind::Optional)).unwrap();
        assert!(resolver.is_ready(b));
    }

    #[test]
    fn prerequisite_edge_blocks_until_override() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let edge = DependencyEdge::new(a, b, EdgeKind::Prerequisite);
        let edge_id = edge.id;
        resolver.add_edge(edge).unwrap();
        assert!(!resolver.is_ready(b));
        resolver.override_edge(edge_id, "oncall");
        assert!(resolver.is_ready(b));
    }

    #[test]
    fn optional_edge_does_not_participate_in_cycle_check() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        resolver.add_edge(DependencyEdge::new(a, b, EdgeKind::Prerequisite)).unwrap();
        assert!(resolver.add_edge(DependencyEdge::new(b, a, EdgeKind::Optional)).is_ok());
    }
}
