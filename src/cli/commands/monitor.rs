//! Monitor snapshot/alert commands (§4.6).
//!
//! `subscribe` seeds a `Monitor` wired to a `RepositoryEventSink` so every
//! tick's snapshot and any alerts it raises persist through the active
//! `Repository`, making `history` and `acknowledge`/`resolve` meaningful
//! against a later invocation. Per-tick stage completion/failure deltas
//! aren't tracked across separate CLI invocations, so `subscribe` always
//! samples them as zero; only pool saturation and queue backlog rules can
//! fire outside of `run`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::adapters::RepositoryEventSink;
use crate::application::{Monitor, MonitorThresholds, SampleInput};
use crate::cli::commands::AppContext;
use crate::cli::display::{action_success, output, relative_time, CommandOutput};
use crate::cli::types::MonitorCommands;
use crate::domain::models::OrchestrationStatus;
use crate::domain::ports::OrchestrationFilter;

pub async fn execute(ctx: &AppContext, command: MonitorCommands) -> Result<()> {
    match command {
        MonitorCommands::Subscribe { ticks, interval_ms } => subscribe(ctx, ticks, interval_ms).await,
        MonitorCommands::Acknowledge { alert_id, by } => acknowledge(ctx, &alert_id, by).await,
        MonitorCommands::Resolve { alert_id, note, by } => resolve(ctx, &alert_id, note, by).await,
        MonitorCommands::History { limit } => history(ctx, limit).await,
    }
}

async fn subscribe(ctx: &AppContext, ticks: u32, interval_ms: u64) -> Result<()> {
    let sink = Arc::new(RepositoryEventSink::new(ctx.repository.clone()));
    let monitor = Monitor::new(MonitorThresholds::default(), Some(sink));
    let (_, mut snapshots) = monitor.subscribe_snapshots();
    let (_, mut alerts) = monitor.subscribe_alerts();

    let mut printed = Vec::new();
    for i in 0..ticks.max(1) {
        let active = ctx
            .repository
            .list_orchestrations(OrchestrationFilter { status: Some(OrchestrationStatus::Running), ..Default::default() })
            .await?
            .len() as u32;
        let queued = ctx
            .repository
            .list_orchestrations(OrchestrationFilter { status: Some(OrchestrationStatus::Queued), ..Default::default() })
            .await?
            .len() as u32;

        monitor
            .tick(SampleInput {
                active_orchestrations: active,
                queued_orchestrations: queued,
                pool_utilization: HashMap::new(),
                success_rate: 1.0,
                ..Default::default()
            })
            .await;

        if let Ok(envelope) = snapshots.try_recv() {
            printed.push(SnapshotView::from(&envelope.payload));
        }
        while let Ok(envelope) = alerts.try_recv() {
            let alert = envelope.payload;
            println!("alert [{:?}] {}", alert.severity, alert.message);
        }

        if i + 1 < ticks.max(1) {
            tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;
        }
    }

    output(&SubscribeOutput { snapshots: printed }, ctx.json);
    Ok(())
}

async fn acknowledge(ctx: &AppContext, alert_id: &str, by: String) -> Result<()> {
    let mut alert = find_open_alert(ctx, alert_id).await?;
    alert.acknowledge(by);
    ctx.repository.update_alert(&alert).await?;
    output(&ActionOutput { message: format!("alert {} acknowledged", alert.id) }, ctx.json);
    Ok(())
}

async fn resolve(ctx: &AppContext, alert_id: &str, note: String, by: String) -> Result<()> {
    let mut alert = find_open_alert(ctx, alert_id).await?;
    alert.resolve(by, note.clone());
    ctx.repository.update_alert(&alert).await?;
    output(
        &ActionOutput { message: format!("alert {} resolved: {note}", alert.id) },
        ctx.json,
    );
    Ok(())
}

async fn find_open_alert(ctx: &AppContext, alert_id: &str) -> Result<crate::domain::models::Alert> {
    let open = ctx.repository.list_open_alerts().await?;
    if let Ok(uuid) = uuid::Uuid::parse_str(alert_id) {
        return open
            .into_iter()
            .find(|a| a.id == uuid)
            .ok_or_else(|| anyhow!("no open alert with id {alert_id}"));
    }
    let matches: Vec<_> = open.into_iter().filter(|a| a.id.to_string().starts_with(alert_id)).collect();
    match matches.len() {
        0 => Err(anyhow!("no open alert matches id prefix {alert_id}")),
        1 => Ok(matches.into_iter().next().expect("checked len == 1")),
        _ => Err(anyhow!("id prefix '{alert_id}' is ambiguous")),
    }
}

async fn history(ctx: &AppContext, limit: usize) -> Result<()> {
    let snapshots = ctx.repository.list_recent_snapshots(limit).await?;
    output(
        &HistoryOutput { snapshots: snapshots.iter().map(SnapshotView::from).collect() },
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

#[derive(Debug, Serialize)]
struct SnapshotView {
    sequence: u64,
    taken_at: String,
    active_orchestrations: u32,
    queued_orchestrations: u32,
    failure_rate: f64,
}

impl From<&crate::domain::models::Snapshot> for SnapshotView {
    fn from(s: &crate::domain::models::Snapshot) -> Self {
        Self {
            sequence: s.sequence,
            taken_at: relative_time(&s.taken_at),
            active_orchestrations: s.active_orchestrations,
            queued_orchestrations: s.queued_orchestrations,
            failure_rate: s.failure_rate(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeOutput {
    snapshots: Vec<SnapshotView>,
}

impl CommandOutput for SubscribeOutput {
    fn to_human(&self) -> String {
        if self.snapshots.is_empty() {
            return "No ticks sampled.".to_string();
        }
        self.snapshots
            .iter()
            .map(|s| {
                format!(
                    "#{} active={} queued={} failure_rate={:.2}",
                    s.sequence, s.active_orchestrations, s.queued_orchestrations, s.failure_rate
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct HistoryOutput {
    snapshots: Vec<SnapshotView>,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        use crate::cli::display::{list_table, render_list};

        if self.snapshots.is_empty() {
            return "No snapshot history.".to_string();
        }
        let mut table = list_table(&["seq", "taken", "active", "queued", "failure_rate"]);
        for s in &self.snapshots {
            table.add_row(vec![
                s.sequence.to_string(),
                s.taken_at.clone(),
                s.active_orchestrations.to_string(),
                s.queued_orchestrations.to_string(),
                format!("{:.2}", s.failure_rate),
            ]);
        }
        render_list("snapshot", table, self.snapshots.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
