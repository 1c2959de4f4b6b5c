//! Monitor (§4.6): periodic snapshot sampling, threshold-rule evaluation,
//! anomaly detection, and alert/snapshot fan-out.
//!
//! Each sampling tick produces one `Snapshot`, published on its own bus so
//! subscribers always see every tick in order (subject to the bus's
//! best-effort lagged-receiver drop). Threshold rules run against that
//! snapshot and any newly raised `Alert`s go out on a second, independent
//! bus — a subscriber only interested in alerts never has to filter a
//! stream of routine snapshots to find them. Late subscribers to either
//! bus catch up on the most recent value before joining the live stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{Alert, AlertKind, ResourceType, Severity, Snapshot, SnapshotHealth};
use crate::domain::ports::EventSink;
use crate::services::{Envelope, EventBus, EventBusConfig, RingBuffer};

/// Thresholds that turn a snapshot's readings into alerts. Defaults match
/// §4.6's rule table; sustain windows use `ChronoDuration::zero()` in
/// tests that want a rule to fire on the very first qualifying tick.
#[derive(Debug, Clone, Copy)]
pub struct MonitorThresholds {
    /// Throughput floor (§4.6): below this, sustained, is a performance
    /// degradation warning.
    pub throughput_floor: f64,
    pub throughput_sustain: ChronoDuration,
    /// Success rate floor, only evaluated once at least
    /// `success_rate_min_items` stages have been observed.
    pub success_rate_floor: f64,
    pub success_rate_min_items: u32,
    /// Instantaneous resource-exhaustion thresholds; either alone trips a
    /// critical alert with no sustain window.
    pub cpu_critical: f64,
    pub memory_critical: f64,
    /// System-overload thresholds: both must hold simultaneously,
    /// sustained, to trip.
    pub cpu_overload: f64,
    pub memory_overload: f64,
    pub overload_sustain: ChronoDuration,
    /// Legacy pool-saturation / backlog rules retained alongside §4.6's
    /// named rules for pool- and queue-scoped alerting the named list
    /// doesn't otherwise cover.
    pub pool_saturation: f64,
    pub queue_backlog: u32,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            throughput_floor: 10.0,
            throughput_sustain: ChronoDuration::minutes(5),
            success_rate_floor: 0.9,
            success_rate_min_items: 100,
            cpu_critical: 95.0,
            memory_critical: 90.0,
            cpu_overload: 90.0,
            memory_overload: 85.0,
            overload_sustain: ChronoDuration::minutes(1),
            pool_saturation: 0.9,
            queue_backlog: 100,
        }
    }
}

/// Raw counters fed into the Monitor on each sampling tick; assembled by
/// the caller from the scheduler, resource broker, orchestrator registry,
/// and a `SystemMetricsProbe` sample.
#[derive(Debug, Clone, Default)]
pub struct SampleInput {
    /// `None` for a system-wide tick, `Some` for a per-orchestration one.
    pub orchestration_id: Option<Uuid>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_io_percent: f64,
    pub network_io_percent: f64,
    pub throughput: f64,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub sla_percent: f64,
    pub cost: f64,
    pub active_orchestrations: u32,
    pub queued_orchestrations: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub pool_utilization: HashMap<ResourceType, f64>,
    pub stages_completed_since_last: u32,
    pub stages_failed_since_last: u32,
}

/// Pluggable predictor run against snapshot history on every tick (§4.6,
/// §9). The null implementation never raises anything; production wiring
/// can swap in a statistical detector without touching the Monitor.
pub trait AnomalyDetector: Send + Sync {
    fn detect(&self, history: &[Snapshot], latest: &Snapshot) -> Option<Alert>;
}

/// Default detector: never flags an anomaly.
pub struct NullAnomalyDetector;

impl AnomalyDetector for NullAnomalyDetector {
    fn detect(&self, _history: &[Snapshot], _latest: &Snapshot) -> Option<Alert> {
        None
    }
}

/// Flags a tick whose latency deviates from the trailing window's mean by
/// more than `z_threshold` standard deviations.
pub struct LatencyZScoreDetector {
    pub window: usize,
    pub min_samples: usize,
    pub z_threshold: f64,
}

impl Default for LatencyZScoreDetector {
    fn default() -> Self {
        Self {
            window: 20,
            min_samples: 5,
            z_threshold: 3.0,
        }
    }
}

impl AnomalyDetector for LatencyZScoreDetector {
    fn detect(&self, history: &[Snapshot], latest: &Snapshot) -> Option<Alert> {
        if history.len() < self.min_samples {
            return None;
        }
        let recent = &history[history.len().saturating_sub(self.window)..];
        let mean = recent.iter().map(|s| s.latency_ms).sum::<f64>() / recent.len() as f64;
        let variance =
            recent.iter().map(|s| (s.latency_ms - mean).powi(2)).sum::<f64>() / recent.len() as f64;
        let stddev = variance.sqrt();
        if stddev < f64::EPSILON {
            return None;
        }
        let z = (latest.latency_ms - mean) / stddev;
        if z.abs() >= self.z_threshold {
            Some(Alert::new(
                AlertKind::Anomaly,
                Severity::Warning,
                format!("latency {:.1}ms is a {:.1}-sigma deviation from the trailing mean", latest.latency_ms, z),
            ))
        } else {
            None
        }
    }
}

/// Tracks how long a boolean condition has held continuously, so sustained
/// threshold rules only fire once the condition has been true for at
/// least the configured window.
#[derive(Debug, Clone, Copy, Default)]
struct Sustain {
    since: Option<DateTime<Utc>>,
}

impl Sustain {
    fn observe(&mut self, now: DateTime<Utc>, condition: bool, window: ChronoDuration) -> bool {
        if !condition {
            self.since = None;
            return false;
        }
        let since = *self.since.get_or_insert(now);
        now - since >= window
    }
}

#[derive(Debug, Default)]
struct SustainState {
    throughput_low: Sustain,
    overload: Sustain,
}

/// A subscription filter applied at the bus boundary: `None` accepts
/// everything, `Some` restricts to events matching that predicate field.
#[derive(Debug, Clone, Default)]
pub struct SubscriberFilter {
    pub orchestration_id: Option<Uuid>,
    pub min_severity: Option<Severity>,
}

impl SubscriberFilter {
    pub fn matches_snapshot(&self, snapshot: &Snapshot) -> bool {
        self.orchestration_id.is_none_or(|id| snapshot.orchestration_id == Some(id))
    }

    pub fn matches_alert(&self, alert: &Alert) -> bool {
        let orchestration_ok =
            self.orchestration_id.is_none_or(|id| alert.related_orchestration == Some(id));
        let severity_ok = self.min_severity.is_none_or(|floor| alert.severity >= floor);
        orchestration_ok && severity_ok
    }
}

/// Samples system state, evaluates threshold rules, runs anomaly
/// detection, and fans out `Snapshot`/`Alert` events to subscribers and an
/// optional durable sink.
pub struct Monitor {
    thresholds: MonitorThresholds,
    next_sequence: AtomicU64,
    snapshot_bus: EventBus<Snapshot>,
    alert_bus: EventBus<Alert>,
    open_alerts: RwLock<HashMap<AlertKind, Alert>>,
    sustain: RwLock<SustainState>,
    history: RwLock<RingBuffer<Snapshot>>,
    anomaly_detector: Box<dyn AnomalyDetector>,
    sink: Option<Arc<dyn EventSink>>,
}

/// Default ring buffer size for in-process snapshot history (§6).
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

impl Monitor {
    pub fn new(thresholds: MonitorThresholds, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self::with_history_and_detector(
            thresholds,
            sink,
            DEFAULT_HISTORY_SIZE,
            Box::new(NullAnomalyDetector),
        )
    }

    pub fn with_history_and_detector(
        thresholds: MonitorThresholds,
        sink: Option<Arc<dyn EventSink>>,
        history_size: usize,
        anomaly_detector: Box<dyn AnomalyDetector>,
    ) -> Self {
        Self {
            thresholds,
            next_sequence: AtomicU64::new(0),
            snapshot_bus: EventBus::new(EventBusConfig::default()),
            alert_bus: EventBus::new(EventBusConfig::default()),
            open_alerts: RwLock::new(HashMap::new()),
            sustain: RwLock::new(SustainState::default()),
            history: RwLock::new(RingBuffer::new(history_size)),
            anomaly_detector,
            sink,
        }
    }

    /// Late subscribers receive the last published snapshot first, then
    /// every subsequent tick in order (§7 catch-up semantics).
    pub fn subscribe_snapshots(&self) -> (Option<Envelope<Snapshot>>, tokio::sync::broadcast::Receiver<Envelope<Snapshot>>) {
        self.snapshot_bus.subscribe_with_catchup()
    }

    pub fn subscribe_alerts(&self) -> (Option<Envelope<Alert>>, tokio::sync::broadcast::Receiver<Envelope<Alert>>) {
        self.alert_bus.subscribe_with_catchup()
    }

    /// Snapshots currently retained in the bounded in-process history,
    /// oldest first, backing the metrics-history query.
    pub async fn history(&self) -> Vec<Snapshot> {
        self.history.read().await.as_vec()
    }

    /// Run one sampling tick: build a `Snapshot`, publish it, evaluate
    /// threshold rules and anomaly detection against it, and publish any
    /// newly raised alerts.
    pub async fn tick(&self, input: SampleInput) -> Snapshot {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = Snapshot::new(sequence);
        snapshot.orchestration_id = input.orchestration_id;
        snapshot.cpu_percent = input.cpu_percent;
        snapshot.memory_percent = input.memory_percent;
        snapshot.disk_io_percent = input.disk_io_percent;
        snapshot.network_io_percent = input.network_io_percent;
        snapshot.throughput = input.throughput;
        snapshot.latency_ms = input.latency_ms;
        snapshot.error_rate = input.error_rate;
        snapshot.success_rate = input.success_rate;
        snapshot.sla_percent = input.sla_percent;
        snapshot.cost = input.cost;
        snapshot.active_orchestrations = input.active_orchestrations;
        snapshot.queued_orchestrations = input.queued_orchestrations;
        snapshot.completed_count = input.completed_count;
        snapshot.failed_count = input.failed_count;
        snapshot.pool_utilization = input.pool_utilization;
        snapshot.stages_completed_since_last = input.stages_completed_since_last;
        snapshot.stages_failed_since_last = input.stages_failed_since_last;

        let alerts = self.evaluate(&snapshot).await;
        snapshot.health = if alerts.iter().any(|a| a.severity == Severity::Critical) {
            SnapshotHealth::Unhealthy
        } else if !alerts.is_empty() || !self.open_alerts.read().await.is_empty() {
            SnapshotHealth::Degraded
        } else {
            SnapshotHealth::Healthy
        };

        self.history.write().await.push(snapshot.clone());

        self.snapshot_bus.publish(snapshot.clone());
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.publish_snapshot(&snapshot).await {
                warn!(error = %err, "snapshot sink publish failed");
            }
        }

        for alert in alerts {
            self.alert_bus.publish(alert.clone());
            if let Some(sink) = &self.sink {
                if let Err(err) = sink.publish_alert(&alert).await {
                    warn!(error = %err, "alert sink publish failed");
                }
            }
        }

        self.sweep_alerts().await;
        snapshot
    }

    /// Threshold rules and anomaly detection against a freshly taken
    /// snapshot. An alert kind already open is not re-raised; it is
    /// resolved once the condition that triggered it clears.
    async fn evaluate(&self, snapshot: &Snapshot) -> Vec<Alert> {
        let mut raised = Vec::new();
        let mut open = self.open_alerts.write().await;
        let mut sustain = self.sustain.write().await;
        let now = snapshot.taken_at;

        let throughput_low = sustain.throughput_low.observe(
            now,
            snapshot.throughput < self.thresholds.throughput_floor,
            self.thresholds.throughput_sustain,
        );
        raised.extend(self.transition(
            &mut open,
            AlertKind::PerformanceDegradation,
            throughput_low,
            Severity::Warning,
            format!("throughput {:.2} below floor, sustained", snapshot.throughput),
        ));

        let success_low = snapshot.items_observed() >= self.thresholds.success_rate_min_items
            && snapshot.success_rate < self.thresholds.success_rate_floor;
        raised.extend(self.transition(
            &mut open,
            AlertKind::ScanFailure,
            success_low,
            Severity::Critical,
            format!("success rate {:.2} below floor over {} items", snapshot.success_rate, snapshot.items_observed()),
        ));

        let exhausted = snapshot.cpu_percent > self.thresholds.cpu_critical
            || snapshot.memory_percent > self.thresholds.memory_critical;
        raised.extend(self.transition(
            &mut open,
            AlertKind::ResourceExhaustion,
            exhausted,
            Severity::Critical,
            format!(
                "cpu {:.1}% / memory {:.1}% exceeds critical threshold",
                snapshot.cpu_percent, snapshot.memory_percent
            ),
        ));

        let overload_condition = snapshot.cpu_percent > self.thresholds.cpu_overload
            && snapshot.memory_percent > self.thresholds.memory_overload;
        let overload = sustain.overload.observe(now, overload_condition, self.thresholds.overload_sustain);
        raised.extend(self.transition(
            &mut open,
            AlertKind::Overload,
            overload,
            Severity::Critical,
            "cpu and memory both sustained above overload thresholds",
        ));

        let saturated = snapshot
            .pool_utilization
            .values()
            .any(|&u| u >= self.thresholds.pool_saturation);
        raised.extend(self.transition(
            &mut open,
            AlertKind::PoolSaturation,
            saturated,
            Severity::Warning,
            "a resource pool is at or above its saturation threshold",
        ));

        let backlogged = snapshot.queued_orchestrations >= self.thresholds.queue_backlog;
        raised.extend(self.transition(
            &mut open,
            AlertKind::QueueBacklog,
            backlogged,
            Severity::Warning,
            format!(
                "{} orchestrations queued, at or above backlog threshold",
                snapshot.queued_orchestrations
            ),
        ));

        drop(sustain);
        drop(open);
        let history = self.history.read().await.as_vec();
        if let Some(alert) = self.anomaly_detector.detect(&history, snapshot) {
            raised.push(alert);
        }

        raised
    }

    /// Open-or-resolve bookkeeping for one alert kind; returns `Some` only
    /// when a new alert was just raised (resolutions are silent).
    fn transition(
        &self,
        open: &mut HashMap<AlertKind, Alert>,
        kind: AlertKind,
        condition: bool,
        severity: Severity,
        message: impl Into<String>,
    ) -> Option<Alert> {
        match (condition, open.get_mut(&kind)) {
            (true, None) => {
                let alert = Alert::new(kind, severity, message);
                open.insert(kind, alert.clone());
                Some(alert)
            }
            (false, Some(existing)) => {
                existing.resolve("monitor", "condition cleared");
                open.remove(&kind);
                None
            }
            _ => None,
        }
    }

    /// Acknowledge an open alert on behalf of `by`. No-op if the kind
    /// isn't currently open or is already acknowledged.
    pub async fn acknowledge_alert(&self, kind: AlertKind, by: impl Into<String>) {
        if let Some(alert) = self.open_alerts.write().await.get_mut(&kind) {
            alert.acknowledge(by);
        }
    }

    /// §4.6 lifecycle sweep: auto-resolve info alerts open for over an
    /// hour, and drop resolved alerts older than 24 hours from the open
    /// set (a resolved alert is already out of `open_alerts`, so this
    /// only needs to handle the auto-resolve half for alerts the open set
    /// is still holding).
    async fn sweep_alerts(&self) {
        let now = Utc::now();
        let mut open = self.open_alerts.write().await;
        let stale: Vec<AlertKind> = open
            .iter()
            .filter(|(_, alert)| alert.is_stale_info(now))
            .map(|(kind, _)| *kind)
            .collect();
        for kind in stale {
            if let Some(mut alert) = open.remove(&kind) {
                alert.resolve("monitor", "auto-resolved after one hour unacknowledged");
            }
        }
    }
}
