//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface,
//! one subcommand group per inbound port (§6): orchestration, resource,
//! monitor, dependency.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scanorc")]
#[command(about = "Enterprise scan orchestration core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Use an ephemeral in-memory store instead of the persistent SQLite database
    #[arg(long, global = true)]
    pub in_memory: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Orchestration lifecycle: create, inspect, and control scan orchestrations
    #[command(subcommand)]
    Orchestration(OrchestrationCommands),

    /// Resource pool allocations and health
    #[command(subcommand)]
    Resource(ResourceCommands),

    /// Monitor snapshots and threshold alerts
    #[command(subcommand)]
    Monitor(MonitorCommands),

    /// Inter-orchestration dependency edges
    #[command(subcommand)]
    Dependency(DependencyCommands),

    /// Run the engine: drain queued orchestrations and sample the monitor
    /// until interrupted or the queue is empty
    Run {
        /// Maximum number of orchestrations driven concurrently
        #[arg(short, long, default_value = "4")]
        max_concurrent: usize,

        /// Exit once the queue drains instead of polling indefinitely
        #[arg(long)]
        once: bool,
    },
}

/// One stage declaration on the command line: `name:operation[:dep1,dep2]`.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: String,
    pub operation: String,
    pub depends_on: Vec<String>,
}

impl std::str::FromStr for StageSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "stage spec must start with a name".to_string())?
            .to_string();
        let operation = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("stage '{name}' is missing an operation"))?
            .to_string();
        let depends_on = parts
            .next()
            .map(|deps| deps.split(',').filter(|d| !d.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self { name, operation, depends_on })
    }
}

#[derive(Subcommand)]
pub enum OrchestrationCommands {
    /// Create a new orchestration and its stage DAG
    Create {
        /// Human-readable name
        name: String,

        /// Orchestration type: discovery, comprehensive, quality, compliance,
        /// classification, lineage, incremental, emergency, maintenance, custom
        #[arg(short = 't', long, default_value = "discovery")]
        orchestration_type: String,

        /// Execution mode: synchronous, asynchronous, streaming, batch, hybrid, adaptive
        #[arg(short, long, default_value = "asynchronous")]
        mode: String,

        /// Priority: background, low, medium, high, critical
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Stage declarations: `name:operation[:dep1,dep2]`, repeatable
        #[arg(long = "stage", required = true)]
        stages: Vec<StageSpec>,

        /// Optional hard deadline, seconds from now
        #[arg(long)]
        deadline_secs: Option<i64>,

        /// Optional cost budget ceiling
        #[arg(long)]
        budget_limit: Option<f64>,

        /// Operator id(s) whose approval is required before this orchestration
        /// may leave `pending_approval`
        #[arg(long, value_delimiter = ',')]
        require_approval: Vec<String>,
    },

    /// Fetch one orchestration by id
    Get {
        id: String,

        /// Render the stage DAG as a tree instead of a flat field list
        #[arg(long)]
        tree: bool,
    },

    /// List orchestrations, optionally filtered
    List {
        /// Filter by lifecycle status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by substring of the orchestration name
        #[arg(short, long)]
        name_contains: Option<String>,
    },

    /// Control a running orchestration's lifecycle
    Control {
        id: String,

        #[command(subcommand)]
        action: ControlAction,
    },

    /// Create up to 100 orchestrations from a JSON batch file
    BulkCreate {
        /// Path to a JSON array of orchestration create requests
        file: PathBuf,

        /// Batch execution mode: parallel, sequential, hybrid
        #[arg(short, long, default_value = "parallel")]
        mode: String,

        /// Concurrency ceiling when `mode` is `parallel`
        #[arg(long, default_value = "8")]
        max_concurrent: usize,
    },

    /// Record an operator approval, releasing a `pending_approval` hold
    Approve {
        id: String,

        /// Operator id recorded as the approver
        approver: String,
    },

    /// Aggregate analytics across orchestrations (counts by status, average
    /// progress, open budget overruns)
    Analytics {
        /// Restrict to a single orchestration instead of the whole fleet
        id: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ControlAction {
    /// Transition from queued to running
    Start,
    Pause,
    Resume,
    Cancel {
        #[arg(default_value = "operator requested cancellation")]
        reason: String,
    },
    Terminate {
        #[arg(default_value = "operator requested termination")]
        reason: String,
    },
    /// Move a failed orchestration back to queued, consuming a retry attempt
    Retry,
}

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// List registered pools and their current utilization
    Query {
        /// Restrict to a single resource type
        resource_type: Option<String>,
    },

    /// Request a scaling pass over pools under watermark pressure
    Optimize {
        /// Optimization scope: global, orchestration, pool
        #[arg(short, long, default_value = "global")]
        scope: String,

        /// Target id when scope is `orchestration` or `pool`
        target: Option<String>,
    },

    /// Report circuit-breaker health per pool
    Health,
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run N sampling ticks against the current fleet state, printing
    /// snapshots and any alerts they raise
    Subscribe {
        /// Number of ticks to sample before exiting
        #[arg(short, long, default_value = "1")]
        ticks: u32,

        /// Delay between ticks, milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Acknowledge an open alert
    Acknowledge {
        alert_id: String,

        /// Who is acknowledging the alert
        #[arg(short, long, default_value = "operator")]
        by: String,
    },

    /// Resolve an open alert with a note
    Resolve {
        alert_id: String,
        note: String,

        /// Who is resolving the alert
        #[arg(short, long, default_value = "operator")]
        by: String,
    },

    /// Query recent snapshot history
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum DependencyCommands {
    /// Add a dependency edge between two orchestrations
    Add {
        source: String,
        dependent: String,

        /// Edge kind: prerequisite, blocking, conditional, parallel, sequential, optional
        #[arg(short, long, default_value = "prerequisite")]
        kind: String,

        /// Wait timeout before a blocking edge's status moves to timed_out, milliseconds
        #[arg(long)]
        wait_timeout_ms: Option<u64>,
    },

    /// Remove a dependency edge
    Remove { edge_id: String },

    /// Override a blocking edge, recording the approving operator
    Override {
        edge_id: String,
        reason: String,

        #[arg(long)]
        approver: String,
    },
}
