//! Stage DAG tree rendering for `orchestration get --tree`.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::cli::display::colorize_status;
use crate::domain::models::Stage;

const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

/// Render every root stage (no `depends_on`) of an orchestration's DAG as
/// an indented tree, recursing into each stage's dependents.
pub fn render_stage_tree(stages: &[Stage]) -> String {
    let by_id: HashMap<Uuid, &Stage> = stages.iter().map(|s| (s.id, s)).collect();
    let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for stage in stages {
        for dep in &stage.depends_on {
            dependents.entry(*dep).or_default().push(stage.id);
        }
    }

    let roots: Vec<Uuid> = stages
        .iter()
        .filter(|s| s.depends_on.is_empty())
        .map(|s| s.id)
        .collect();

    let mut out = String::new();
    let mut visited = HashSet::new();
    for (i, root) in roots.iter().enumerate() {
        let is_last = i + 1 == roots.len();
        render_node(*root, &by_id, &dependents, 0, is_last, "", &mut visited, &mut out);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn render_node(
    id: Uuid,
    by_id: &HashMap<Uuid, &Stage>,
    dependents: &HashMap<Uuid, Vec<Uuid>>,
    depth: usize,
    is_last: bool,
    prefix: &str,
    visited: &mut HashSet<Uuid>,
    out: &mut String,
) {
    let Some(stage) = by_id.get(&id) else { return };
    let connector = if depth == 0 {
        ""
    } else if is_last {
        TREE_LAST
    } else {
        TREE_BRANCH
    };
    out.push_str(&format!(
        "{}{}{} [{}]\n",
        prefix,
        connector,
        stage.name,
        colorize_status(stage.status.as_str())
    ));

    if !visited.insert(id) {
        return;
    }

    let next_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}{TREE_SPACE}")
    } else {
        format!("{prefix}{TREE_PIPE}")
    };

    if let Some(children) = dependents.get(&id) {
        for (i, child) in children.iter().enumerate() {
            let child_is_last = i + 1 == children.len();
            render_node(*child, by_id, dependents, depth + 1, child_is_last, &next_prefix, visited, out);
        }
    }
}
