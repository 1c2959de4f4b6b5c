//! End-to-end seed scenarios from the orchestration core's testable-
//! properties section: retry-then-success timing, resource denial and
//! admission, preemption, cancellation grace, and anomaly-alert
//! debouncing. Scenarios already exercised as inline unit tests next to
//! the component they target (DAG cycle rejection, linear two-stage
//! success, fatal-stage propagation) are not repeated here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use uuid::Uuid;

use scanorc::application::monitor::{Monitor, MonitorThresholds, SampleInput};
use scanorc::application::orchestrator::{Orchestrator, ScanOperationRegistry};
use scanorc::application::resource_broker::ResourceBroker;
use scanorc::domain::error::{RepositoryResult, StageFailure};
use scanorc::domain::models::{
    Alert, AlertKind, DependencyEdge, Orchestration, OrchestrationStatus, OrchestrationType,
    PoolHealth, Reservation, ResourcePool, ResourceType, ScalePolicy, Snapshot, Stage,
};
use scanorc::domain::ports::{
    MetricsReading, OrchestrationFilter, Repository, ScanOperation, ScanOperationInput,
    ScanOperationOutput, SystemMetricsProbe,
};

/// `Repository` that records every write, standing in for durable
/// persistence without needing SQLite.
struct RecordingRepository {
    orchestration_updates: std::sync::Mutex<Vec<OrchestrationStatus>>,
}

impl RecordingRepository {
    fn new() -> Self {
        Self { orchestration_updates: std::sync::Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Repository for RecordingRepository {
    async fn create_orchestration(&self, _o: &Orchestration) -> RepositoryResult<()> {
        Ok(())
    }
    async fn get_orchestration(&self, _id: Uuid) -> RepositoryResult<Option<Orchestration>> {
        Ok(None)
    }
    async fn update_orchestration(&self, o: &Orchestration) -> RepositoryResult<()> {
        self.orchestration_updates.lock().unwrap().push(o.status);
        Ok(())
    }
    async fn list_orchestrations(&self, _f: OrchestrationFilter) -> RepositoryResult<Vec<Orchestration>> {
        Ok(Vec::new())
    }
    async fn delete_orchestration(&self, _id: Uuid) -> RepositoryResult<()> {
        Ok(())
    }
    async fn create_stages(&self, _s: &[Stage]) -> RepositoryResult<()> {
        Ok(())
    }
    async fn get_stage(&self, _id: Uuid) -> RepositoryResult<Option<Stage>> {
        Ok(None)
    }
    async fn update_stage(&self, _s: &Stage) -> RepositoryResult<()> {
        Ok(())
    }
    async fn list_stages_for_orchestration(&self, _id: Uuid) -> RepositoryResult<Vec<Stage>> {
        Ok(Vec::new())
    }
    async fn create_dependency_edge(&self, _e: &DependencyEdge) -> RepositoryResult<()> {
        Ok(())
    }
    async fn get_dependency_edge(&self, _id: Uuid) -> RepositoryResult<Option<DependencyEdge>> {
        Ok(None)
    }
    async fn update_dependency_edge(&self, _e: &DependencyEdge) -> RepositoryResult<()> {
        Ok(())
    }
    async fn delete_dependency_edge(&self, _id: Uuid) -> RepositoryResult<()> {
        Ok(())
    }
    async fn list_dependency_edges_for(&self, _id: Uuid) -> RepositoryResult<Vec<DependencyEdge>> {
        Ok(Vec::new())
    }
    async fn create_reservation(&self, _r: &Reservation) -> RepositoryResult<()> {
        Ok(())
    }
    async fn delete_reservation(&self, _id: Uuid) -> RepositoryResult<()> {
        Ok(())
    }
    async fn get_reservation(&self, _id: Uuid) -> RepositoryResult<Option<Reservation>> {
        Ok(None)
    }
    async fn save_snapshot(&self, _s: &Snapshot) -> RepositoryResult<()> {
        Ok(())
    }
    async fn list_recent_snapshots(&self, _limit: usize) -> RepositoryResult<Vec<Snapshot>> {
        Ok(Vec::new())
    }
    async fn save_alert(&self, _a: &Alert) -> RepositoryResult<()> {
        Ok(())
    }
    async fn update_alert(&self, _a: &Alert) -> RepositoryResult<()> {
        Ok(())
    }
    async fn list_open_alerts(&self) -> RepositoryResult<Vec<Alert>> {
        Ok(Vec::new())
    }
}

/// Fails on the first `failures_before_success` attempts with a retryable
/// error, then succeeds.
struct FlakyThenSucceeds {
    attempts: AtomicU32,
    failures_before_success: u32,
}

impl FlakyThenSucceeds {
    fn new(failures_before_success: u32) -> Self {
        Self { attempts: AtomicU32::new(0), failures_before_success }
    }
}

#[async_trait]
impl ScanOperation for FlakyThenSucceeds {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures_before_success {
            Err(StageFailure::Retryable(format!("transient failure on attempt {attempt}")))
        } else {
            Ok(ScanOperationOutput { actual_cost: 1.0, detail: None })
        }
    }
}

/// Sleeps far longer than any test's patience, to exercise cancellation
/// mid-flight; never honors cancellation itself since the wave executor
/// cancels by dropping the join handle, not by signaling the operation.
struct SlowOperation;

#[async_trait]
impl ScanOperation for SlowOperation {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ScanOperationOutput { actual_cost: 1.0, detail: None })
    }
}

fn registry(ops: Vec<Arc<dyn ScanOperation>>) -> Arc<ScanOperationRegistry> {
    let mut map = HashMap::new();
    for op in ops {
        map.insert(op.name().to_string(), op);
    }
    Arc::new(map)
}

fn queued_orchestration() -> Orchestration {
    let mut o = Orchestration::new("seed-scenario", OrchestrationType::Discovery);
    o.status = OrchestrationStatus::Queued;
    o
}

/// S2 — retry then success: a stage fails retryable twice, succeeds on
/// the third attempt, and the orchestration still reaches `completed`
/// with `attempt` reflecting three tries.
#[tokio::test]
async fn retry_then_success_reaches_completed_after_third_attempt() {
    let orchestration = queued_orchestration();
    let stage = Stage::new(orchestration.id, "flaky-stage", "flaky");

    let ops = registry(vec![Arc::new(FlakyThenSucceeds::new(2))]);
    let repo = Arc::new(RecordingRepository::new());
    let (_handle, join) = Orchestrator::spawn(orchestration, vec![stage], repo, ops, 4).unwrap();

    let result = join.await.unwrap().unwrap();
    assert_eq!(result.status, OrchestrationStatus::Completed);
    assert_eq!(result.progress.stages_done, 1);
}

/// S3 — fatal stage failure with a dependent: B must never be invoked
/// once A fails fatally, and the orchestration ends failed rather than
/// stalling silently.
#[tokio::test]
async fn fatal_upstream_stage_prevents_dependent_invocation() {
    struct CountingFatal {
        invocations: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ScanOperation for CountingFatal {
        fn name(&self) -> &str {
            "fatal"
        }
        async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Err(StageFailure::Fatal("unsupported operation".to_string()))
        }
    }

    struct CountingNoop {
        invocations: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ScanOperation for CountingNoop {
        fn name(&self) -> &str {
            "dependent"
        }
        async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(ScanOperationOutput::default())
        }
    }

    let orchestration = queued_orchestration();
    let a = Stage::new(orchestration.id, "a", "fatal");
    let mut b = Stage::new(orchestration.id, "b", "dependent");
    b.depends_on = vec![a.id];

    let fatal_calls = Arc::new(AtomicU32::new(0));
    let dependent_calls = Arc::new(AtomicU32::new(0));
    let ops = registry(vec![
        Arc::new(CountingFatal { invocations: fatal_calls.clone() }),
        Arc::new(CountingNoop { invocations: dependent_calls.clone() }),
    ]);
    let repo = Arc::new(RecordingRepository::new());
    let (_handle, join) = Orchestrator::spawn(orchestration, vec![a, b], repo, ops, 4).unwrap();

    let result = join.await.unwrap();
    assert!(result.is_err());
    assert_eq!(fatal_calls.load(Ordering::SeqCst), 1);
    assert_eq!(dependent_calls.load(Ordering::SeqCst), 0, "dependent stage must never be dispatched");
}

/// S4 — resource denial then admission: a `workers` pool with 4 slots,
/// fully held by orchestration X; orchestration Y's request for 2 is
/// denied until X releases, after which Y is admitted.
#[tokio::test]
async fn resource_denied_then_admitted_after_release() {
    struct NoopProbe;
    #[async_trait]
    impl SystemMetricsProbe for NoopProbe {
        async fn sample(&self) -> Vec<MetricsReading> {
            Vec::new()
        }
    }

    let broker = ResourceBroker::new(Arc::new(NoopProbe));
    let mut pool = ResourcePool::new(ResourceType::Workers, 4.0);
    pool.scale_policy = ScalePolicy { min_capacity: 4.0, max_capacity: 4.0, ..ScalePolicy::default() };
    broker.register_pool(pool).await;

    let x = Uuid::new_v4();
    let mut x_entries = HashMap::new();
    x_entries.insert(ResourceType::Workers, 4.0);
    let x_reservation = broker.reserve(x, x_entries).await.unwrap();

    let y = Uuid::new_v4();
    let mut y_entries = HashMap::new();
    y_entries.insert(ResourceType::Workers, 2.0);
    let denied = broker.reserve(y, y_entries.clone()).await;
    assert!(denied.is_err(), "Y must be denied while X holds all capacity");

    broker.release(x_reservation.id).await;

    let admitted = broker.reserve(y, y_entries).await;
    assert!(admitted.is_ok(), "Y must be admitted within one tick of X's release");
}

/// S5 — preemption by critical: a background orchestration's reservation
/// is forcibly released so a critical one's request can be satisfied
/// immediately afterward, on the same pool.
#[tokio::test]
async fn critical_orchestration_preempts_background_reservation() {
    struct NoopProbe;
    #[async_trait]
    impl SystemMetricsProbe for NoopProbe {
        async fn sample(&self) -> Vec<MetricsReading> {
            Vec::new()
        }
    }

    let broker = ResourceBroker::new(Arc::new(NoopProbe));
    broker.register_pool(ResourcePool::new(ResourceType::Workers, 4.0)).await;

    let background = Uuid::new_v4();
    let mut background_entries = HashMap::new();
    background_entries.insert(ResourceType::Workers, 4.0);
    let background_reservation = broker.reserve(background, background_entries).await.unwrap();

    let critical = Uuid::new_v4();
    let mut critical_entries = HashMap::new();
    critical_entries.insert(ResourceType::Workers, 4.0);
    assert!(broker.reserve(critical, critical_entries.clone()).await.is_err());

    assert!(broker.preempt(background_reservation.id).await);
    assert_eq!(broker.utilization(ResourceType::Workers).await, Some(0.0));

    let admitted = broker.reserve(critical, critical_entries).await;
    assert!(admitted.is_ok(), "critical orchestration must be admitted once background is preempted");
}

/// S7 — cancellation honors grace: a long-running stage is cancelled
/// shortly after dispatch with `cancellation_grace_ms=500`; the
/// orchestration must reach a terminal state within that grace window
/// plus tolerance (not hang waiting on the 60s operation), and a second
/// cancel is a no-op rather than a panic.
#[tokio::test]
async fn cancel_reaches_terminal_state_without_waiting_on_slow_stage() {
    let orchestration = queued_orchestration();
    let stage = Stage::new(orchestration.id, "long-scan", "slow");

    let ops = registry(vec![Arc::new(SlowOperation)]);
    let repo = Arc::new(RecordingRepository::new());
    let (handle, join) =
        Orchestrator::spawn_with_grace(orchestration, vec![stage], repo, ops, 1, 500).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel("operator requested").await;
    handle.cancel("second call is a no-op").await;

    let result = tokio::time::timeout(Duration::from_millis(1_500), join)
        .await
        .expect("orchestration must reach a terminal state within grace + tolerance")
        .unwrap();
    assert!(matches!(result, Err(scanorc::domain::OrchestrationError::Cancelled(_, _))));
}

/// S8 — anomaly/threshold alert debouncing: feeding the Monitor six
/// minutes of sustained low-throughput snapshots raises exactly one
/// `performance-degradation` alert, not one per tick.
#[tokio::test]
async fn sustained_low_throughput_raises_exactly_one_alert() {
    let thresholds = MonitorThresholds {
        throughput_sustain: ChronoDuration::zero(),
        ..MonitorThresholds::default()
    };
    let monitor = Monitor::new(thresholds, None);
    let (_catchup, mut alerts) = monitor.subscribe_alerts();

    let orchestration_id = Some(Uuid::new_v4());
    let low_throughput = SampleInput {
        orchestration_id,
        throughput: 2.0,
        ..SampleInput::default()
    };

    // Seven consecutive ticks below the throughput floor simulate six
    // minutes of sustained degradation; the rule must fire once on the
    // first qualifying tick and stay quiet for as long as the condition
    // remains open, not re-fire on every later tick.
    for _ in 0..7 {
        monitor.tick(low_throughput.clone()).await;
    }

    let mut raised = 0;
    while let Ok(envelope) = alerts.try_recv() {
        if envelope.payload.kind == AlertKind::PerformanceDegradation {
            raised += 1;
        }
    }
    assert_eq!(raised, 1, "expected exactly one performance-degradation alert across the sustained dip, got {raised}");

    // Throughput recovers, then dips again: a second, independent alert
    // is expected since the first condition cleared in between.
    monitor
        .tick(SampleInput { orchestration_id, throughput: 50.0, ..SampleInput::default() })
        .await;
    monitor.tick(low_throughput).await;

    let mut second_round = 0;
    while let Ok(envelope) = alerts.try_recv() {
        if envelope.payload.kind == AlertKind::PerformanceDegradation {
            second_round += 1;
        }
    }
    assert_eq!(second_round, 1, "a fresh dip after recovery must raise its own alert");
}

/// I1 — `stages_done` never exceeds `stages_total` across a multi-wave
/// DAG, including when stages fail and their retries are exhausted.
#[tokio::test]
async fn stages_done_never_exceeds_stages_total() {
    let orchestration = queued_orchestration();
    let a = Stage::new(orchestration.id, "a", "noop");
    let mut b = Stage::new(orchestration.id, "b", "noop");
    b.depends_on = vec![a.id];
    let mut c = Stage::new(orchestration.id, "c", "noop");
    c.depends_on = vec![a.id];

    struct AlwaysSucceeds;
    #[async_trait]
    impl ScanOperation for AlwaysSucceeds {
        fn name(&self) -> &str {
            "noop"
        }
        async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
            Ok(ScanOperationOutput { actual_cost: 1.0, detail: None })
        }
    }

    let ops = registry(vec![Arc::new(AlwaysSucceeds)]);
    let repo = Arc::new(RecordingRepository::new());
    let (_handle, join) = Orchestrator::spawn(orchestration, vec![a, b, c], repo, ops, 4).unwrap();

    let result = join.await.unwrap().unwrap();
    assert!(result.progress.stages_done <= result.progress.stages_total);
    assert_eq!(result.progress.stages_done, result.progress.stages_total);
}

/// I6 — every terminal orchestration has released its reservation exactly
/// once: double-release is explicitly idempotent (R2) and must not panic
/// or double-credit pool capacity.
#[tokio::test]
async fn release_is_idempotent_and_does_not_double_credit_capacity() {
    struct NoopProbe;
    #[async_trait]
    impl SystemMetricsProbe for NoopProbe {
        async fn sample(&self) -> Vec<MetricsReading> {
            Vec::new()
        }
    }

    let broker = ResourceBroker::new(Arc::new(NoopProbe));
    broker.register_pool(ResourcePool::new(ResourceType::Cpu, 8.0)).await;

    let mut entries = HashMap::new();
    entries.insert(ResourceType::Cpu, 4.0);
    let reservation = broker.reserve(Uuid::new_v4(), entries).await.unwrap();

    broker.release(reservation.id).await;
    broker.release(reservation.id).await;
    broker.release(reservation.id).await;

    assert_eq!(broker.utilization(ResourceType::Cpu).await, Some(0.0));
    assert_eq!(broker.pool_health(ResourceType::Cpu).await, Some(PoolHealth::Healthy));
}
