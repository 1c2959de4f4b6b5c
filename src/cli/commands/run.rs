//! `run`: the engine's long-lived loop (§4.1/§4.6 tied together).
//!
//! Drains `queued` orchestrations into `Orchestrator` actors up to
//! `max_concurrent`, taking a Monitor snapshot on every
//! `snapshot_interval_ms` tick, until interrupted (`Ctrl-C`) or — with
//! `--once` — until both the in-flight set and the queue are empty.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::adapters::in_memory::simulated_registry;
use crate::adapters::RepositoryEventSink;
use crate::application::{Monitor, MonitorThresholds, Orchestrator, SampleInput};
use crate::cli::commands::AppContext;
use crate::domain::models::{Orchestration, OrchestrationStatus};
use crate::domain::ports::OrchestrationFilter;
use crate::domain::OrchestrationResult;

pub async fn execute(ctx: &AppContext, max_concurrent: usize, once: bool) -> Result<()> {
    let max_concurrent = max_concurrent.max(1);
    let sink = Arc::new(RepositoryEventSink::new(ctx.repository.clone()));
    let monitor = Monitor::new(MonitorThresholds::default(), Some(sink));

    let mut in_flight: JoinSet<(Uuid, OrchestrationResult<Orchestration>)> = JoinSet::new();
    let mut active_ids: HashSet<Uuid> = HashSet::new();
    let snapshot_interval = Duration::from_millis(ctx.config.snapshot_interval_ms.max(100));
    let mut next_tick = Instant::now() + snapshot_interval;

    loop {
        sweep_approval_timeouts(ctx).await?;
        top_up(ctx, &mut in_flight, &mut active_ids, max_concurrent).await?;

        if once && in_flight.is_empty() {
            let queue_len = ctx
                .repository
                .list_orchestrations(OrchestrationFilter {
                    status: Some(OrchestrationStatus::Queued),
                    ..Default::default()
                })
                .await?
                .len();
            if queue_len == 0 {
                break;
            }
        }

        tokio::select! {
            joined = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Some(Ok((id, result))) = joined {
                    active_ids.remove(&id);
                    match result {
                        Ok(finished) => info!(orchestration_id = %finished.id, "orchestration finished"),
                        Err(err) => error!(orchestration_id = %id, error = %err, "orchestration did not complete cleanly"),
                    }
                }
            }
            () = tokio::time::sleep_until(next_tick) => {
                sample_tick(ctx, &monitor).await?;
                next_tick = Instant::now() + snapshot_interval;
            }
            _ = tokio::signal::ctrl_c(), if !once => {
                info!("received interrupt, draining in-flight orchestrations before exit");
                while in_flight.join_next().await.is_some() {}
                break;
            }
        }
    }

    Ok(())
}

/// Elapses any orchestration that has sat in `pending_approval` longer
/// than `approval_timeout_ms` to `cancelled`, mirroring §4.4's dependency
/// wait-timeout pattern rather than holding an approval gate forever.
async fn sweep_approval_timeouts(ctx: &AppContext) -> Result<()> {
    let pending = ctx
        .repository
        .list_orchestrations(OrchestrationFilter {
            status: Some(OrchestrationStatus::PendingApproval),
            ..Default::default()
        })
        .await?;

    for mut orchestration in pending {
        if !orchestration.approval_timed_out(ctx.config.approval_timeout_ms) {
            continue;
        }
        if orchestration.transition_to(OrchestrationStatus::Cancelled).is_ok() {
            orchestration.last_error = Some("approval_timeout".to_string());
            info!(orchestration_id = %orchestration.id, "pending_approval hold timed out, cancelling");
            ctx.repository.update_orchestration(&orchestration).await?;
        }
    }
    Ok(())
}

async fn top_up(
    ctx: &AppContext,
    in_flight: &mut JoinSet<(Uuid, OrchestrationResult<Orchestration>)>,
    active_ids: &mut HashSet<Uuid>,
    max_concurrent: usize,
) -> Result<()> {
    while active_ids.len() < max_concurrent {
        let queued = ctx
            .repository
            .list_orchestrations(OrchestrationFilter {
                status: Some(OrchestrationStatus::Queued),
                ..Default::default()
            })
            .await?;
        let Some(next) = queued.into_iter().find(|o| !active_ids.contains(&o.id)) else {
            break;
        };

        let stages = ctx.repository.list_stages_for_orchestration(next.id).await?;
        let operation_names: Vec<&str> = stages.iter().map(|s| s.operation.as_str()).collect();
        let registry = Arc::new(simulated_registry(&operation_names));
        let id = next.id;

        match Orchestrator::spawn(next, stages, ctx.repository.clone(), registry, 4) {
            Ok((_handle, join)) => {
                active_ids.insert(id);
                in_flight.spawn(async move {
                    match join.await {
                        Ok(result) => (id, result),
                        Err(join_err) => (
                            id,
                            Err(crate::domain::OrchestrationError::Internal(join_err.to_string())),
                        ),
                    }
                });
            }
            Err(err) => {
                error!(orchestration_id = %id, error = %err, "invalid stage DAG, skipping orchestration");
            }
        }
    }
    Ok(())
}

async fn sample_tick(ctx: &AppContext, monitor: &Monitor) -> Result<()> {
    let active = ctx
        .repository
        .list_orchestrations(OrchestrationFilter {
            status: Some(OrchestrationStatus::Running),
            ..Default::default()
        })
        .await?
        .len() as u32;
    let queued = ctx
        .repository
        .list_orchestrations(OrchestrationFilter {
            status: Some(OrchestrationStatus::Queued),
            ..Default::default()
        })
        .await?
        .len() as u32;

    monitor
        .tick(SampleInput {
            active_orchestrations: active,
            queued_orchestrations: queued,
            pool_utilization: HashMap::new(),
            success_rate: 1.0,
            sla_percent: 100.0,
            ..Default::default()
        })
        .await;
    Ok(())
}
