//! Orchestration lifecycle commands: create, inspect, list, control,
//! bulk-create, approve, and analytics.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::in_memory::simulated_registry;
use crate::application::Orchestrator;
use crate::cli::commands::{
    parse_mode, parse_orchestration_type, parse_priority, parse_status, resolve_orchestration,
    AppContext,
};
use crate::cli::display::{action_success, output, CommandOutput, DetailView};
use crate::cli::output::render_stage_tree;
use crate::cli::types::{ControlAction, OrchestrationCommands, StageSpec};
use crate::domain::models::{
    Budget, Orchestration, OrchestrationStatus, Stage,
};
use crate::domain::ports::OrchestrationFilter;

pub async fn execute(ctx: &AppContext, command: OrchestrationCommands) -> Result<()> {
    match command {
        OrchestrationCommands::Create {
            name,
            orchestration_type,
            mode,
            priority,
            stages,
            deadline_secs,
            budget_limit,
            require_approval,
        } => create(ctx, name, orchestration_type, mode, priority, stages, deadline_secs, budget_limit, require_approval).await,

        OrchestrationCommands::Get { id, tree } => get(ctx, &id, tree).await,

        OrchestrationCommands::List { status, name_contains } => list(ctx, status, name_contains).await,

        OrchestrationCommands::Control { id, action } => control(ctx, &id, action).await,

        OrchestrationCommands::BulkCreate { file, mode, max_concurrent } => {
            bulk_create(ctx, file, mode, max_concurrent).await
        }

        OrchestrationCommands::Approve { id, approver } => approve(ctx, &id, approver).await,

        OrchestrationCommands::Analytics { id } => analytics(ctx, id).await,
    }
}

fn stages_from_specs(orchestration_id: Uuid, specs: &[StageSpec]) -> Result<Vec<Stage>> {
    let mut by_name = HashMap::new();
    let mut stages = Vec::with_capacity(specs.len());
    for spec in specs {
        let stage = Stage::new(orchestration_id, spec.name.clone(), spec.operation.clone());
        by_name.insert(spec.name.clone(), stage.id);
        stages.push(stage);
    }
    for (stage, spec) in stages.iter_mut().zip(specs) {
        for dep_name in &spec.depends_on {
            let dep_id = by_name
                .get(dep_name)
                .ok_or_else(|| anyhow!("stage '{}' depends on unknown stage '{dep_name}'", spec.name))?;
            stage.depends_on.push(*dep_id);
        }
    }
    Ok(stages)
}

#[allow(clippy::too_many_arguments)]
async fn create(
    ctx: &AppContext,
    name: String,
    orchestration_type: String,
    mode: String,
    priority: String,
    stage_specs: Vec<StageSpec>,
    deadline_secs: Option<i64>,
    budget_limit: Option<f64>,
    require_approval: Vec<String>,
) -> Result<()> {
    let orchestration_type = parse_orchestration_type(&orchestration_type)?;
    let mode = parse_mode(&mode)?;
    let priority = parse_priority(&priority)?;

    let mut orchestration = Orchestration::new(name, orchestration_type);
    orchestration.mode = mode;
    orchestration.priority = priority;
    orchestration.deadline = deadline_secs.map(|secs| Utc::now() + ChronoDuration::seconds(secs));
    orchestration.budget = Budget { limit: budget_limit, ..Budget::default() };
    orchestration.required_approvals = require_approval;

    let stages = stages_from_specs(orchestration.id, &stage_specs)?;
    crate::domain::models::StageDag::from_stages(&stages)
        .context("stage declarations do not form a valid DAG")?;

    orchestration
        .transition_to(OrchestrationStatus::Planning)
        .map_err(|e| anyhow!(e))?;
    if orchestration.requires_approval() {
        orchestration
            .transition_to(OrchestrationStatus::PendingApproval)
            .map_err(|e| anyhow!(e))?;
    } else {
        orchestration
            .transition_to(OrchestrationStatus::Queued)
            .map_err(|e| anyhow!(e))?;
    }

    ctx.repository.create_orchestration(&orchestration).await?;
    ctx.repository.create_stages(&stages).await?;

    let out = ActionOutput {
        message: format!(
            "orchestration '{}' created with {} stage(s), status {}",
            orchestration.id,
            stages.len(),
            orchestration.status.as_str()
        ),
        id: Some(orchestration.id.to_string()),
    };
    output(&out, ctx.json);
    Ok(())
}

async fn get(ctx: &AppContext, id: &str, tree: bool) -> Result<()> {
    let orchestration = resolve_orchestration(ctx, id).await?;
    let stages = ctx
        .repository
        .list_stages_for_orchestration(orchestration.id)
        .await?;

    if tree && !ctx.json {
        println!("{}", render_stage_tree(&stages));
        return Ok(());
    }

    let out = OrchestrationDetail::new(&orchestration, &stages);
    output(&out, ctx.json);
    Ok(())
}

async fn list(ctx: &AppContext, status: Option<String>, name_contains: Option<String>) -> Result<()> {
    let status = status.as_deref().map(parse_status).transpose()?;
    let filter = OrchestrationFilter { status, name_contains };
    let orchestrations = ctx.repository.list_orchestrations(filter).await?;

    let out = OrchestrationListOutput {
        total: orchestrations.len(),
        orchestrations: orchestrations.iter().map(OrchestrationSummary::from).collect(),
    };
    output(&out, ctx.json);
    Ok(())
}

async fn control(ctx: &AppContext, id: &str, action: ControlAction) -> Result<()> {
    let mut orchestration = resolve_orchestration(ctx, id).await?;

    let message = match action {
        ControlAction::Start => {
            if orchestration.status != OrchestrationStatus::Queued {
                return Err(anyhow!(
                    "orchestration {} is {}, not queued; cannot start",
                    orchestration.id,
                    orchestration.status.as_str()
                ));
            }
            let stages = ctx
                .repository
                .list_stages_for_orchestration(orchestration.id)
                .await?;
            let operation_names: Vec<&str> = stages.iter().map(|s| s.operation.as_str()).collect();
            let registry = Arc::new(simulated_registry(&operation_names));

            let (_handle, join) = Orchestrator::spawn(
                orchestration.clone(),
                stages,
                ctx.repository.clone(),
                registry,
                ctx.config.worker_count.min(16).max(1),
            )
            .map_err(|e| anyhow!("invalid stage DAG: {e}"))?;

            match join.await {
                Ok(Ok(finished)) => {
                    orchestration = finished;
                    format!("orchestration {} completed", orchestration.id)
                }
                Ok(Err(err)) => format!("orchestration {} did not complete cleanly: {err}", orchestration.id),
                Err(join_err) => return Err(anyhow!("orchestrator task panicked: {join_err}")),
            }
        }
        ControlAction::Pause => {
            orchestration.transition_to(OrchestrationStatus::Paused).map_err(|e| anyhow!(e))?;
            ctx.repository.update_orchestration(&orchestration).await?;
            format!("orchestration {} paused", orchestration.id)
        }
        ControlAction::Resume => {
            orchestration.transition_to(OrchestrationStatus::Running).map_err(|e| anyhow!(e))?;
            ctx.repository.update_orchestration(&orchestration).await?;
            format!("orchestration {} resumed", orchestration.id)
        }
        ControlAction::Cancel { reason } => {
            orchestration.last_error = Some(reason.clone());
            orchestration.transition_to(OrchestrationStatus::Cancelled).map_err(|e| anyhow!(e))?;
            ctx.repository.update_orchestration(&orchestration).await?;
            format!("orchestration {} cancelled: {reason}", orchestration.id)
        }
        ControlAction::Terminate { reason } => {
            orchestration.last_error = Some(reason.clone());
            orchestration.transition_to(OrchestrationStatus::Terminated).map_err(|e| anyhow!(e))?;
            ctx.repository.update_orchestration(&orchestration).await?;
            format!("orchestration {} terminated: {reason}", orchestration.id)
        }
        ControlAction::Retry => {
            if !orchestration.retry.has_attempts_remaining() {
                return Err(anyhow!(
                    "orchestration {} has exhausted its retry budget ({}/{})",
                    orchestration.id,
                    orchestration.retry.retry_count,
                    orchestration.retry.max_retries
                ));
            }
            orchestration.transition_to(OrchestrationStatus::Retrying).map_err(|e| anyhow!(e))?;
            orchestration.transition_to(OrchestrationStatus::Queued).map_err(|e| anyhow!(e))?;
            ctx.repository.update_orchestration(&orchestration).await?;
            format!(
                "orchestration {} re-queued for retry #{}",
                orchestration.id, orchestration.retry.retry_count
            )
        }
    };

    output(&ActionOutput { message, id: Some(orchestration.id.to_string()) }, ctx.json);
    Ok(())
}

#[derive(Debug, Deserialize)]
struct BulkStageSpec {
    name: String,
    operation: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BulkOrchestrationSpec {
    name: String,
    #[serde(default = "default_type")]
    orchestration_type: String,
    #[serde(default = "default_priority")]
    priority: String,
    stages: Vec<BulkStageSpec>,
    #[serde(default)]
    budget_limit: Option<f64>,
}

fn default_type() -> String {
    "discovery".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

/// `mode` only affects how this command itself fans out persistence work;
/// it has no bearing on the created orchestrations' own `OrchestrationMode`.
async fn bulk_create(ctx: &AppContext, file: std::path::PathBuf, mode: String, max_concurrent: usize) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read bulk create file {}", file.display()))?;
    let specs: Vec<BulkOrchestrationSpec> = serde_json::from_str(&raw)
        .context("bulk create file must contain a JSON array of orchestration specs")?;
    if specs.len() > 100 {
        return Err(anyhow!("bulk create accepts at most 100 orchestrations, got {}", specs.len()));
    }

    let sequential = mode.eq_ignore_ascii_case("sequential");
    let chunk_size = if sequential { 1 } else { max_concurrent.max(1) };

    let mut created_ids = Vec::with_capacity(specs.len());
    for chunk in specs.chunks(chunk_size) {
        let mut handles = Vec::new();
        for spec in chunk {
            let orchestration_type = parse_orchestration_type(&spec.orchestration_type)?;
            let priority = parse_priority(&spec.priority)?;
            let mut orchestration = Orchestration::new(spec.name.clone(), orchestration_type);
            orchestration.priority = priority;
            orchestration.budget = Budget { limit: spec.budget_limit, ..Budget::default() };

            let stage_specs: Vec<StageSpec> = spec
                .stages
                .iter()
                .map(|s| StageSpec {
                    name: s.name.clone(),
                    operation: s.operation.clone(),
                    depends_on: s.depends_on.clone(),
                })
                .collect();
            let stages = stages_from_specs(orchestration.id, &stage_specs)?;
            crate::domain::models::StageDag::from_stages(&stages)
                .with_context(|| format!("orchestration '{}' has an invalid stage DAG", spec.name))?;

            orchestration.transition_to(OrchestrationStatus::Planning).map_err(|e| anyhow!(e))?;
            orchestration.transition_to(OrchestrationStatus::Queued).map_err(|e| anyhow!(e))?;

            let repository = ctx.repository.clone();
            handles.push(tokio::spawn(async move {
                repository.create_orchestration(&orchestration).await?;
                repository.create_stages(&stages).await?;
                Ok::<Uuid, crate::domain::error::RepositoryError>(orchestration.id)
            }));
        }
        for handle in handles {
            let id = handle.await.context("bulk create task panicked")??;
            created_ids.push(id.to_string());
        }
    }

    output(
        &ActionOutput {
            message: format!("created {} orchestration(s)", created_ids.len()),
            id: None,
        },
        ctx.json,
    );
    Ok(())
}

async fn approve(ctx: &AppContext, id: &str, approver: String) -> Result<()> {
    let mut orchestration = resolve_orchestration(ctx, id).await?;
    orchestration.required_approvals.retain(|a| a != &approver);

    let message = if orchestration.required_approvals.is_empty()
        && orchestration.status == OrchestrationStatus::PendingApproval
    {
        orchestration.transition_to(OrchestrationStatus::Queued).map_err(|e| anyhow!(e))?;
        format!("orchestration {} fully approved and queued", orchestration.id)
    } else {
        format!(
            "approval recorded for {}; {} approval(s) still required",
            orchestration.id,
            orchestration.required_approvals.len()
        )
    };

    ctx.repository.update_orchestration(&orchestration).await?;
    output(&ActionOutput { message, id: Some(orchestration.id.to_string()) }, ctx.json);
    Ok(())
}

async fn analytics(ctx: &AppContext, id: Option<String>) -> Result<()> {
    let orchestrations = if let Some(id) = &id {
        vec![resolve_orchestration(ctx, id).await?]
    } else {
        ctx.repository
            .list_orchestrations(OrchestrationFilter::default())
            .await?
    };

    let mut by_status: HashMap<String, usize> = HashMap::new();
    let mut total_percent = 0u32;
    let mut budget_overruns = 0usize;
    for o in &orchestrations {
        *by_status.entry(o.status.as_str().to_string()).or_insert(0) += 1;
        total_percent += o.progress.percent();
        if !o.budget.within_limit() {
            budget_overruns += 1;
        }
    }
    let average_progress_percent = if orchestrations.is_empty() {
        0
    } else {
        total_percent / orchestrations.len() as u32
    };

    let out = AnalyticsOutput {
        total: orchestrations.len(),
        by_status,
        average_progress_percent,
        budget_overruns,
    };
    output(&out, ctx.json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ActionOutput {
    message: String,
    id: Option<String>,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        action_success(&self.message)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct OrchestrationSummary {
    id: String,
    name: String,
    orchestration_type: String,
    status: String,
    priority: String,
    progress_percent: u32,
}

impl From<&Orchestration> for OrchestrationSummary {
    fn from(o: &Orchestration) -> Self {
        Self {
            id: o.id.to_string(),
            name: o.name.clone(),
            orchestration_type: o.orchestration_type.as_str().to_string(),
            status: o.status.as_str().to_string(),
            priority: o.priority.as_str().to_string(),
            progress_percent: o.progress.percent(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OrchestrationListOutput {
    orchestrations: Vec<OrchestrationSummary>,
    total: usize,
}

impl CommandOutput for OrchestrationListOutput {
    fn to_human(&self) -> String {
        use crate::cli::display::{colorize_priority, colorize_status, list_table, render_list, short_id};

        if self.orchestrations.is_empty() {
            return "No orchestrations found.".to_string();
        }
        let mut table = list_table(&["id", "name", "type", "status", "priority", "progress"]);
        for o in &self.orchestrations {
            table.add_row(vec![
                short_id(&o.id).to_string(),
                o.name.clone(),
                o.orchestration_type.clone(),
                colorize_status(&o.status).to_string(),
                colorize_priority(&o.priority).to_string(),
                format!("{}%", o.progress_percent),
            ]);
        }
        render_list("orchestration", table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct OrchestrationDetail {
    id: String,
    name: String,
    orchestration_type: String,
    mode: String,
    priority: String,
    status: String,
    progress_percent: u32,
    stages_done: u32,
    stages_total: u32,
    budget_limit: Option<f64>,
    actual_cost: f64,
    deadline: Option<String>,
    required_approvals: Vec<String>,
    last_error: Option<String>,
    stage_count: usize,
}

impl OrchestrationDetail {
    fn new(o: &Orchestration, stages: &[Stage]) -> Self {
        Self {
            id: o.id.to_string(),
            name: o.name.clone(),
            orchestration_type: o.orchestration_type.as_str().to_string(),
            mode: format!("{:?}", o.mode),
            priority: o.priority.as_str().to_string(),
            status: o.status.as_str().to_string(),
            progress_percent: o.progress.percent(),
            stages_done: o.progress.stages_done,
            stages_total: o.progress.stages_total,
            budget_limit: o.budget.limit,
            actual_cost: o.budget.actual_cost,
            deadline: o.deadline.map(|d| d.to_rfc3339()),
            required_approvals: o.required_approvals.clone(),
            last_error: o.last_error.clone(),
            stage_count: stages.len(),
        }
    }
}

impl CommandOutput for OrchestrationDetail {
    fn to_human(&self) -> String {
        use crate::cli::display::colorize_status;

        let mut view = DetailView::new(&self.name)
            .field("id", &self.id)
            .field("type", &self.orchestration_type)
            .field("mode", &self.mode)
            .field("priority", &self.priority)
            .field("status", &colorize_status(&self.status).to_string())
            .field("progress", &format!("{}% ({}/{})", self.progress_percent, self.stages_done, self.stages_total))
            .field("stages", &self.stage_count.to_string())
            .field("actual cost", &format!("{:.2}", self.actual_cost));

        if let Some(limit) = self.budget_limit {
            view = view.field("budget limit", &format!("{limit:.2}"));
        }
        view = view.field_opt("deadline", self.deadline.as_deref());
        view = view.field_opt("last error", self.last_error.as_deref());

        if !self.required_approvals.is_empty() {
            view = view.section("pending approvals");
            for approver in &self.required_approvals {
                view = view.item(approver);
            }
        }

        view.render()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct AnalyticsOutput {
    total: usize,
    by_status: HashMap<String, usize>,
    average_progress_percent: u32,
    budget_overruns: usize,
}

impl CommandOutput for AnalyticsOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} orchestration(s) analyzed", self.total)];
        for (status, count) in &self.by_status {
            lines.push(format!("  {status:<16} {count}"));
        }
        lines.push(format!("average progress: {}%", self.average_progress_percent));
        lines.push(format!("budget overruns: {}", self.budget_overruns));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
