//! Resource pool query, optimize, and health commands (§4.3).
//!
//! Standalone `resource` invocations have no durable pool state to read —
//! the `Repository` port persists orchestrations, stages, dependency
//! edges, reservations, snapshots, and alerts, but never a pool's
//! capacity or scale state. Each invocation here seeds a fresh
//! `ResourceBroker` from `config.pool_defaults`, takes one live probe
//! reading, and reports that. Durable pool state only exists for the
//! lifetime of a `run` invocation's broker.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::application::{ResourceBroker, ResourceLimits, ResourceMonitor};
use crate::cli::commands::{parse_resource_type, AppContext, ALL_RESOURCE_TYPES};
use crate::cli::display::{action_success, output, CommandOutput};
use crate::cli::types::ResourceCommands;
use crate::domain::models::ResourcePool;

pub async fn execute(ctx: &AppContext, command: ResourceCommands) -> Result<()> {
    match command {
        ResourceCommands::Query { resource_type } => query(ctx, resource_type).await,
        ResourceCommands::Optimize { scope, target } => optimize(ctx, scope, target).await,
        ResourceCommands::Health => health(ctx).await,
    }
}

async fn seeded_broker(ctx: &AppContext) -> ResourceBroker {
    let monitor = Arc::new(ResourceMonitor::new(ResourceLimits::default()));
    let broker = ResourceBroker::new(monitor);
    for resource_type in ALL_RESOURCE_TYPES {
        let mut pool = ResourcePool::new(resource_type, ctx.config.pool_defaults.total_capacity);
        pool.scale_policy.high_watermark = ctx.config.pool_defaults.high_watermark;
        pool.scale_policy.low_watermark = ctx.config.pool_defaults.low_watermark;
        if ctx.config.pool_defaults.auto_scale {
            pool.scale_policy.max_capacity = ctx.config.pool_defaults.total_capacity * 4.0;
            pool.scale_policy.min_capacity = ctx.config.pool_defaults.total_capacity;
            pool.scale_policy.scale_increment = ctx.config.pool_defaults.total_capacity / 4.0;
        }
        broker.register_pool(pool).await;
    }
    broker.refresh_from_probe().await;
    broker
}

async fn query(ctx: &AppContext, resource_type: Option<String>) -> Result<()> {
    let broker = seeded_broker(ctx).await;
    let filter = resource_type.as_deref().map(parse_resource_type).transpose()?;
    let snapshots: Vec<_> = broker
        .snapshot_all()
        .await
        .into_iter()
        .filter(|s| filter.map_or(true, |f| f == s.resource_type))
        .collect();

    output(&PoolQueryOutput { pools: snapshots.into_iter().map(Into::into).collect() }, ctx.json);
    Ok(())
}

async fn optimize(ctx: &AppContext, scope: String, target: Option<String>) -> Result<()> {
    if !matches!(scope.as_str(), "global" | "orchestration" | "pool") {
        return Err(anyhow!("unknown optimization scope: {scope}"));
    }
    if scope != "global" && target.is_none() {
        return Err(anyhow!("scope '{scope}' requires a target id"));
    }

    let broker = seeded_broker(ctx).await;
    let changed = broker.optimize().await;

    let message = if changed.is_empty() {
        "no pools required rescaling".to_string()
    } else {
        format!(
            "rescaled {} pool(s): {}",
            changed.len(),
            changed.iter().map(|t| format!("{t:?}")).collect::<Vec<_>>().join(", ")
        )
    };
    output(&ActionOutput { message }, ctx.json);
    Ok(())
}

async fn health(ctx: &AppContext) -> Result<()> {
    let broker = seeded_broker(ctx).await;
    let snapshots = broker.snapshot_all().await;
    // A standalone `resource health` invocation has no live scheduler to
    // ask about queue saturation, so the rollup only ever reflects pool
    // state here; `run` wires the real scheduler backlog in.
    let system_health = broker.system_health(false).await;
    output(
        &HealthOutput {
            system_health: format!("{system_health:?}"),
            pools: snapshots.into_iter().map(Into::into).collect(),
        },
        ctx.json,
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthOutput {
    system_health: String,
    pools: Vec<PoolView>,
}

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        use crate::cli::display::{list_table, render_list};

        let mut out = format!("system health: {}\n", self.system_health);
        if self.pools.is_empty() {
            out.push_str("No pools registered.");
            return out;
        }
        let mut table = list_table(&["resource", "capacity", "reserved", "available", "utilization", "health", "circuit"]);
        for pool in &self.pools {
            table.add_row(vec![
                pool.resource_type.clone(),
                format!("{:.1}", pool.total_capacity),
                format!("{:.1}", pool.reserved),
                format!("{:.1}", pool.available),
                format!("{:.0}%", pool.utilization * 100.0),
                pool.health.clone(),
                pool.circuit_state.clone(),
            ]);
        }
        out.push_str(&render_list("pool", table, self.pools.len()));
        out
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
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
struct PoolView {
    resource_type: String,
    total_capacity: f64,
    reserved: f64,
    available: f64,
    utilization: f64,
    health: String,
    circuit_state: String,
}

impl From<crate::application::PoolSnapshot> for PoolView {
    fn from(s: crate::application::PoolSnapshot) -> Self {
        Self {
            resource_type: format!("{:?}", s.resource_type),
            total_capacity: s.total_capacity,
            reserved: s.reserved,
            available: s.available,
            utilization: s.utilization,
            health: format!("{:?}", s.health),
            circuit_state: format!("{:?}", s.circuit_state),
        }
    }
}

#[derive(Debug, Serialize)]
struct PoolQueryOutput {
    pools: Vec<PoolView>,
}

impl CommandOutput for PoolQueryOutput {
    fn to_human(&self) -> String {
        use crate::cli::display::{list_table, render_list};

        if self.pools.is_empty() {
            return "No pools registered.".to_string();
        }
        let mut table = list_table(&["resource", "capacity", "reserved", "available", "utilization", "health", "circuit"]);
        for pool in &self.pools {
            table.add_row(vec![
                pool.resource_type.clone(),
                format!("{:.1}", pool.total_capacity),
                format!("{:.1}", pool.reserved),
                format!("{:.1}", pool.available),
                format!("{:.0}%", pool.utilization * 100.0),
                pool.health.clone(),
                pool.circuit_state.clone(),
            ]);
        }
        render_list("pool", table, self.pools.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
