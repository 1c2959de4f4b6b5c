//! Inter-orchestration dependency edge commands (§4.4).
//!
//! The `Repository` port only lists edges touching one orchestration at a
//! time (`list_dependency_edges_for`), not the whole graph, so `add`
//! builds a transient `DependencyResolver` from just the edges already
//! touching `source` or `dependent` to run the cycle check before
//! persisting the new edge directly. A cycle routed entirely through
//! orchestrations neither endpoint has an edge with already cannot exist
//! — any path into this pair must pass through one of them.

use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::application::DependencyResolver;
use crate::cli::commands::{parse_edge_kind, resolve_orchestration, AppContext};
use crate::cli::display::{action_success, output, CommandOutput};
use crate::cli::types::DependencyCommands;
use crate::domain::models::DependencyEdge;

pub async fn execute(ctx: &AppContext, command: DependencyCommands) -> Result<()> {
    match command {
        DependencyCommands::Add { source, dependent, kind, wait_timeout_ms } => {
            add(ctx, source, dependent, kind, wait_timeout_ms).await
        }
        DependencyCommands::Remove { edge_id } => remove(ctx, &edge_id).await,
        DependencyCommands::Override { edge_id, reason, approver } => {
            override_edge(ctx, &edge_id, reason, approver).await
        }
    }
}

async fn add(
    ctx: &AppContext,
    source: String,
    dependent: String,
    kind: String,
    wait_timeout_ms: Option<u64>,
) -> Result<()> {
    let source = resolve_orchestration(ctx, &source).await?;
    let dependent = resolve_orchestration(ctx, &dependent).await?;
    let kind = parse_edge_kind(&kind)?;

    let mut resolver = DependencyResolver::new();
    let mut seen = std::collections::HashSet::new();
    for edge in ctx.repository.list_dependency_edges_for(source.id).await? {
        if seen.insert(edge.id) {
            let _ = resolver.add_edge(edge);
        }
    }
    for edge in ctx.repository.list_dependency_edges_for(dependent.id).await? {
        if seen.insert(edge.id) {
            let _ = resolver.add_edge(edge);
        }
    }

    let mut new_edge = DependencyEdge::new(source.id, dependent.id, kind);
    new_edge.wait_timeout_ms = wait_timeout_ms;

    resolver
        .add_edge(new_edge.clone())
        .map_err(|e| anyhow!("cannot add edge: {e}"))?;

    ctx.repository.create_dependency_edge(&new_edge).await?;
    output(
        &ActionOutput {
            message: format!("dependency edge {} created: {} -> {}", new_edge.id, source.id, dependent.id),
        },
        ctx.json,
    );
    Ok(())
}

async fn remove(ctx: &AppContext, edge_id: &str) -> Result<()> {
    let edge_id = Uuid::parse_str(edge_id).map_err(|_| anyhow!("invalid edge id: {edge_id}"))?;
    ctx.repository
        .get_dependency_edge(edge_id)
        .await?
        .ok_or_else(|| anyhow!("no dependency edge with id {edge_id}"))?;
    ctx.repository.delete_dependency_edge(edge_id).await?;
    output(&ActionOutput { message: format!("dependency edge {edge_id} removed") }, ctx.json);
    Ok(())
}

async fn override_edge(ctx: &AppContext, edge_id: &str, reason: String, approver: String) -> Result<()> {
    let edge_id = Uuid::parse_str(edge_id).map_err(|_| anyhow!("invalid edge id: {edge_id}"))?;
    let mut edge = ctx
        .repository
        .get_dependency_edge(edge_id)
        .await?
        .ok_or_else(|| anyhow!("no dependency edge with id {edge_id}"))?;

    edge.override_with(approver.clone());
    ctx.repository.update_dependency_edge(&edge).await?;
    output(
        &ActionOutput {
            message: format!("dependency edge {edge_id} overridden by {approver} ({reason})"),
        },
        ctx.json,
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct ActionOutput {
    message: String,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        action_success(&self.message)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
