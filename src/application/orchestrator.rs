//! Per-orchestration owner actor (§4.1).
//!
//! Each live `Orchestration` is driven by exactly one actor task, owning
//! its `Stage` map and `StageDag` exclusively — no other task ever
//! mutates them, so stage state never needs a lock. External callers only
//! reach the actor through its `OrchestratorHandle` mailbox; the actor
//! drives its DAG wave by wave, dispatching every stage a wave makes
//! ready concurrently (bounded by a semaphore), in the same shape as a
//! wave-based task executor, generalized from per-task agents to
//! per-stage scan operations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;
use uuid::Uuid;

use crate::domain::error::StageFailure;
use crate::domain::models::{
    Orchestration, OrchestrationStatus, Stage, StageDag, StageFailureKind, StageOutcome,
    StageStatus,
};
use crate::domain::ports::{Repository, ScanOperation, ScanOperationInput, ScanOperationOutput};
use crate::domain::{OrchestrationError, OrchestrationResult};

/// Control messages an `OrchestratorHandle` may send its actor.
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    Pause,
    Resume,
    Cancel(String),
    Terminate(String),
}

/// Cheap, cloneable handle to a running orchestrator actor's mailbox.
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub orchestration_id: Uuid,
    sender: mpsc::Sender<OrchestratorCommand>,
}

impl OrchestratorHandle {
    pub async fn pause(&self) {
        let _ = self.sender.send(OrchestratorCommand::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.sender.send(OrchestratorCommand::Resume).await;
    }

    pub async fn cancel(&self, reason: impl Into<String>) {
        let _ = self.sender.send(OrchestratorCommand::Cancel(reason.into())).await;
    }

    pub async fn terminate(&self, reason: impl Into<String>) {
        let _ = self
            .sender
            .send(OrchestratorCommand::Terminate(reason.into()))
            .await;
    }
}

/// Registry of scan operations dispatchable by name, shared read-only
/// across every orchestrator actor.
pub type ScanOperationRegistry = HashMap<String, Arc<dyn ScanOperation>>;

/// Default grace period honored between a cooperative `Cancel` and a
/// forced abort of whatever stages are still in flight (§5, §6).
pub const DEFAULT_CANCELLATION_GRACE_MS: u64 = 30_000;

/// Owns one orchestration's lifecycle and DAG execution end to end.
pub struct Orchestrator {
    orchestration: Orchestration,
    stages: HashMap<Uuid, Stage>,
    dag: StageDag,
    repository: Arc<dyn Repository>,
    operations: Arc<ScanOperationRegistry>,
    max_concurrency: usize,
    cancellation_grace_ms: u64,
}

impl Orchestrator {
    /// Build the actor and spawn it with the default cancellation grace
    /// period, returning a handle to control it and the `JoinHandle` that
    /// resolves with the final orchestration state.
    pub fn spawn(
        orchestration: Orchestration,
        stages: Vec<Stage>,
        repository: Arc<dyn Repository>,
        operations: Arc<ScanOperationRegistry>,
        max_concurrency: usize,
    ) -> Result<
        (
            OrchestratorHandle,
            tokio::task::JoinHandle<OrchestrationResult<Orchestration>>,
        ),
        crate::domain::models::DagError,
    > {
        Self::spawn_with_grace(
            orchestration,
            stages,
            repository,
            operations,
            max_concurrency,
            DEFAULT_CANCELLATION_GRACE_MS,
        )
    }

    /// As `spawn`, with an explicit cancellation grace period in
    /// milliseconds — the bound a `Cancel` gives in-flight stages to wind
    /// down cooperatively before they are forcibly aborted (§5's "hard
    /// deadline: 30s after cancellation the Orchestrator force-terminates
    /// outstanding stages").
    pub fn spawn_with_grace(
        orchestration: Orchestration,
        stages: Vec<Stage>,
        repository: Arc<dyn Repository>,
        operations: Arc<ScanOperationRegistry>,
        max_concurrency: usize,
        cancellation_grace_ms: u64,
    ) -> Result<
        (
            OrchestratorHandle,
            tokio::task::JoinHandle<OrchestrationResult<Orchestration>>,
        ),
        crate::domain::models::DagError,
    > {
        let dag = StageDag::from_stages(&stages)?;
        let (sender, mailbox) = mpsc::channel(32);
        let handle = OrchestratorHandle {
            orchestration_id: orchestration.id,
            sender,
        };

        let actor = Self {
            orchestration,
            stages: stages.into_iter().map(|s| (s.id, s)).collect(),
            dag,
            repository,
            operations,
            max_concurrency: max_concurrency.max(1),
            cancellation_grace_ms,
        };

        let join = tokio::spawn(actor.run(mailbox));
        Ok((handle, join))
    }

    /// Drives the orchestration to a terminal state. `mailbox` is held
    /// locally (not on `self`) so a wave's execution and a command arrival
    /// can be raced against each other with `tokio::select!` without two
    /// simultaneous mutable borrows of `self`.
    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<OrchestratorCommand>,
    ) -> OrchestrationResult<Orchestration> {
        self.orchestration
            .transition_to(OrchestrationStatus::Running)
            .map_err(OrchestrationError::Conflict)?;
        self.persist_orchestration().await;

        let mut completed: HashSet<Uuid> = HashSet::new();
        let mut paused = false;
        self.orchestration.progress.stages_total = self.stages.len() as u32;

        loop {
            while let Ok(cmd) = mailbox.try_recv() {
                match cmd {
                    OrchestratorCommand::Pause => paused = true,
                    OrchestratorCommand::Resume => paused = false,
                    OrchestratorCommand::Cancel(reason) => {
                        return self.finish_interrupted(OrchestrationStatus::Cancelled, reason).await;
                    }
                    OrchestratorCommand::Terminate(reason) => {
                        return self.finish_interrupted(OrchestrationStatus::Terminated, reason).await;
                    }
                }
            }

            if completed.len() == self.stages.len() {
                break;
            }
            if paused {
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            let ready: Vec<Uuid> = self
                .dag
                .ready_set(&completed)
                .into_iter()
                .filter(|id| {
                    self.stages
                        .get(id)
                        .map(|s| {
                            // A stage left `Failed` after a retryable
                            // outcome is still dispatchable for its next
                            // attempt; only a non-terminal stage or a
                            // failed-with-attempts-left one belongs in
                            // this wave (exhausted/fatal failures already
                            // short-circuited the orchestration below).
                            !s.status.is_terminal()
                                || (s.status == StageStatus::Failed && s.can_retry())
                        })
                        .unwrap_or(false)
                })
                .collect();

            if ready.is_empty() {
                // No ready work and not all stages completed: something
                // upstream failed fatally and left dependents unreachable.
                self.orchestration.last_error =
                    Some("no further stages are reachable; a dependency failed".to_string());
                self.orchestration
                    .transition_to(OrchestrationStatus::Failed)
                    .ok();
                self.persist_orchestration().await;
                return Err(OrchestrationError::Internal(
                    "orchestration stalled with unreachable stages".to_string(),
                ));
            }

            // Race the wave against a command arriving mid-flight: a
            // `Pause`/`Resume` seen here is applied and the wave keeps
            // running (pausing only stops new waves from starting), but
            // `Cancel`/`Terminate` must interrupt stages already in
            // flight rather than wait for the whole wave to finish.
            let outcomes = match self
                .run_wave_interruptible(&ready, &mut mailbox, &mut paused)
                .await
            {
                WaveOutcome::Finished(outcomes) => outcomes,
                WaveOutcome::Interrupted(status, reason) => {
                    return self.finish_interrupted(status, reason).await;
                }
            };

            let mut retry_delay_ms = 0u64;
            let mut fatal = false;
            for (stage_id, result) in outcomes {
                match result {
                    Ok(cost) => {
                        completed.insert(stage_id);
                        self.orchestration.progress.stages_done += 1;
                        self.orchestration.budget.actual_cost += cost;
                    }
                    Err(StageRetryOutcome::Retry(delay_ms)) => {
                        retry_delay_ms = retry_delay_ms.max(delay_ms);
                    }
                    Err(StageRetryOutcome::Fatal) => {
                        fatal = true;
                    }
                }
                self.persist_stage(stage_id).await;
            }
            self.persist_orchestration().await;

            if fatal {
                self.orchestration.last_error =
                    Some("one or more stages failed with no attempts remaining".to_string());
                self.orchestration
                    .transition_to(OrchestrationStatus::Failed)
                    .ok();
                self.persist_orchestration().await;
                return Err(OrchestrationError::Internal("stage failure".to_string()));
            }

            if retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
            }
        }

        self.orchestration
            .transition_to(OrchestrationStatus::Completing)
            .ok();
        self.orchestration
            .transition_to(OrchestrationStatus::Completed)
            .ok();
        self.orchestration.completion = Some(Utc::now());
        self.persist_orchestration().await;
        Ok(self.orchestration.clone())
    }

    async fn finish_interrupted(
        &mut self,
        status: OrchestrationStatus,
        reason: String,
    ) -> OrchestrationResult<Orchestration> {
        self.orchestration.last_error = Some(reason.clone());
        self.orchestration.transition_to(status).ok();
        self.persist_orchestration().await;
        match status {
            OrchestrationStatus::Terminated => {
                Err(OrchestrationError::Terminated(self.orchestration.id, reason))
            }
            _ => Err(OrchestrationError::Cancelled(self.orchestration.id, reason)),
        }
    }

    /// Dispatch every stage in `ready` concurrently, bounded by
    /// `max_concurrency`, racing the wave's completion against the
    /// orchestrator's command mailbox so a `Cancel`/`Terminate` arriving
    /// mid-wave is honored without waiting for every in-flight stage.
    async fn run_wave_interruptible(
        &mut self,
        ready: &[Uuid],
        mailbox: &mut mpsc::Receiver<OrchestratorCommand>,
        paused: &mut bool,
    ) -> WaveOutcome {
        let mut set = self.dispatch_wave(ready).await;
        let mut results = Vec::new();

        loop {
            tokio::select! {
                joined = set.join_next() => {
                    match joined {
                        Some(joined) => {
                            if let Some(outcome) = self.apply_joined(joined) {
                                results.push(outcome);
                            }
                        }
                        None => return WaveOutcome::Finished(results),
                    }
                }
                cmd = mailbox.recv() => {
                    match cmd {
                        Some(OrchestratorCommand::Pause) => *paused = true,
                        Some(OrchestratorCommand::Resume) => *paused = false,
                        Some(OrchestratorCommand::Cancel(reason)) => {
                            return self
                                .drain_or_abort(set, mailbox, OrchestrationStatus::Cancelled, reason)
                                .await;
                        }
                        Some(OrchestratorCommand::Terminate(reason)) => {
                            set.abort_all();
                            return WaveOutcome::Interrupted(OrchestrationStatus::Terminated, reason);
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Give in-flight stages `cancellation_grace_ms` to finish
    /// cooperatively; whichever are still running once the grace elapses
    /// (or a `Terminate` arrives) are aborted outright via the `JoinSet`.
    /// Stage outcomes from this point are discarded — the orchestration is
    /// already committed to a terminal, non-completed state.
    async fn drain_or_abort(
        &mut self,
        mut set: JoinSet<WaveTaskResult>,
        mailbox: &mut mpsc::Receiver<OrchestratorCommand>,
        status: OrchestrationStatus,
        reason: String,
    ) -> WaveOutcome {
        let grace = tokio::time::sleep(Duration::from_millis(self.cancellation_grace_ms));
        tokio::pin!(grace);
        loop {
            tokio::select! {
                joined = set.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                cmd = mailbox.recv() => {
                    if let Some(OrchestratorCommand::Terminate(_)) = cmd {
                        set.abort_all();
                        break;
                    }
                }
                _ = &mut grace => {
                    set.abort_all();
                    break;
                }
            }
        }
        WaveOutcome::Interrupted(status, reason)
    }

    async fn dispatch_wave(&mut self, ready: &[Uuid]) -> JoinSet<WaveTaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for &stage_id in ready {
            let Some(mut stage) = self.stages.get(&stage_id).cloned() else {
                continue;
            };
            if stage.status == StageStatus::Pending {
                stage.transition_to(StageStatus::Ready).ok();
            }
            if stage.status == StageStatus::Failed {
                stage.transition_to(StageStatus::Retrying).ok();
                stage.transition_to(StageStatus::Ready).ok();
            }
            stage.transition_to(StageStatus::Running).ok();
            stage.started_at = Some(Utc::now());
            self.stages.insert(stage_id, stage.clone());

            let orchestration_id = self.orchestration.id;
            let operation = self.operations.get(&stage.operation).cloned();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closes");

            set.spawn(async move {
                let _permit = permit;
                let Some(operation) = operation else {
                    return (
                        stage_id,
                        Err(StageFailure::Fatal(format!(
                            "no scan operation registered for {}",
                            stage.operation
                        ))),
                        stage.attempt,
                    );
                };
                let input = ScanOperationInput {
                    orchestration_id,
                    stage: stage.clone(),
                };
                let result = operation.execute(input).await;
                (stage_id, result, stage.attempt)
            });
        }

        set
    }

    /// Apply one joined stage task's outcome to `self.stages`, returning
    /// the wave-level result to report back to `run`. Returns `None` for a
    /// task that panicked or was aborted (e.g. by `drain_or_abort`).
    fn apply_joined(
        &mut self,
        joined: Result<WaveTaskResult, tokio::task::JoinError>,
    ) -> Option<(Uuid, Result<f64, StageRetryOutcome>)> {
        let Ok((stage_id, outcome, attempt)) = joined else {
            return None;
        };
        match outcome {
            Ok(output) => {
                if let Some(stage) = self.stages.get_mut(&stage_id) {
                    stage.transition_to(StageStatus::Completed).ok();
                    stage.last_outcome = Some(StageOutcome {
                        failure_kind: None,
                        message: output.detail.clone(),
                        attempt,
                        finished_at: Utc::now(),
                    });
                }
                Some((stage_id, Ok(output.actual_cost)))
            }
            Err(failure) => {
                let retryable = failure.is_retryable();
                let (can_retry, delay_ms) = if let Some(stage) = self.stages.get_mut(&stage_id) {
                    stage.attempt = attempt + 1;
                    let can_retry = retryable && stage.can_retry();
                    let delay_ms = stage.retry_policy.delay_for_attempt(attempt);
                    stage.transition_to(StageStatus::Failed).ok();
                    stage.last_outcome = Some(StageOutcome {
                        failure_kind: Some(if retryable {
                            StageFailureKind::Retryable
                        } else {
                            StageFailureKind::Fatal
                        }),
                        message: Some(failure.message().to_string()),
                        attempt: stage.attempt,
                        finished_at: Utc::now(),
                    });
                    (can_retry, delay_ms)
                } else {
                    (false, 0)
                };

                if can_retry {
                    Some((stage_id, Err(StageRetryOutcome::Retry(delay_ms))))
                } else {
                    Some((stage_id, Err(StageRetryOutcome::Fatal)))
                }
            }
        }
    }

    async fn persist_orchestration(&self) {
        if let Err(err) = self.repository.update_orchestration(&self.orchestration).await {
            warn!(error = %err, orchestration_id = %self.orchestration.id, "failed to persist orchestration state");
        }
    }

    async fn persist_stage(&self, stage_id: Uuid) {
        let Some(stage) = self.stages.get(&stage_id) else {
            return;
        };
        if let Err(err) = self.repository.update_stage(stage).await {
            warn!(error = %err, stage_id = %stage_id, "failed to persist stage state");
        }
    }
}

/// Internal per-stage wave outcome, distinguishing a stage that should be
/// retried in a later wave from one that has definitively failed.
#[derive(Debug, Clone, Copy)]
enum StageRetryOutcome {
    Retry(u64),
    Fatal,
}

/// Raw result of one spawned stage task, before `apply_joined` folds it
/// into `self.stages`.
type WaveTaskResult = (Uuid, Result<ScanOperationOutput, StageFailure>, u32);

/// Outcome of racing a wave's execution against the command mailbox.
enum WaveOutcome {
    Finished(Vec<(Uuid, Result<f64, StageRetryOutcome>)>),
    Interrupted(OrchestrationStatus, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::RepositoryResult;
    use crate::domain::models::{Alert, DependencyEdge, OrchestrationType, Reservation, Snapshot};
    use crate::domain::ports::{OrchestrationFilter, ScanOperationOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NoopRepository {
        updates: Mutex<Vec<Uuid>>,
    }

    impl NoopRepository {
        fn new() -> Self {
            Self { updates: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Repository for NoopRepository {
        async fn create_orchestration(&self, _o: &Orchestration) -> RepositoryResult<()> {
            Ok(())
        }
        async fn get_orchestration(&self, _id: Uuid) -> RepositoryResult<Option<Orchestration>> {
            Ok(None)
        }
        async fn update_orchestration(&self, o: &Orchestration) -> RepositoryResult<()> {
            self.updates.lock().unwrap().push(o.id);
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

    struct AlwaysFatal;

    #[async_trait]
    impl ScanOperation for AlwaysFatal {
        fn name(&self) -> &str {
            "fatal"
        }
        async fn execute(&self, _input: ScanOperationInput) -> Result<ScanOperationOutput, StageFailure> {
            Err(StageFailure::Fatal("always fails".to_string()))
        }
    }

    fn registry(ops: Vec<Arc<dyn ScanOperation>>) -> Arc<ScanOperationRegistry> {
        let mut map = HashMap::new();
        for op in ops {
            map.insert(op.name().to_string(), op);
        }
        Arc::new(map)
    }

    #[tokio::test]
    async fn linear_dag_completes_successfully() {
        let mut orchestration = Orchestration::new("test", OrchestrationType::Discovery);
        orchestration.status = OrchestrationStatus::Queued;
        let s1 = Stage::new(orchestration.id, "a", "noop");
        let mut s2 = Stage::new(orchestration.id, "b", "noop");
        s2.depends_on = vec![s1.id];

        let ops = registry(vec![Arc::new(AlwaysSucceeds)]);
        let repo = Arc::new(NoopRepository::new());
        let (_handle, join) = Orchestrator::spawn(orchestration, vec![s1, s2], repo, ops, 4).unwrap();

        let result = join.await.unwrap().unwrap();
        assert_eq!(result.status, OrchestrationStatus::Completed);
        assert_eq!(result.progress.stages_done, 2);
    }

    #[tokio::test]
    async fn fatal_stage_fails_orchestration() {
        let mut orchestration = Orchestration::new("test", OrchestrationType::Discovery);
        orchestration.status = OrchestrationStatus::Queued;
        let stage = Stage::new(orchestration.id, "a", "fatal");

        let ops = registry(vec![Arc::new(AlwaysFatal)]);
        let repo = Arc::new(NoopRepository::new());
        let (_handle, join) = Orchestrator::spawn(orchestration, vec![stage], repo, ops, 4).unwrap();

        let result = join.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_command_stops_orchestration() {
        let mut orchestration = Orchestration::new("test", OrchestrationType::Discovery);
        orchestration.status = OrchestrationStatus::Queued;
        let stage = Stage::new(orchestration.id, "a", "noop");

        let ops = registry(vec![Arc::new(AlwaysSucceeds)]);
        let repo = Arc::new(NoopRepository::new());
        let (handle, join) = Orchestrator::spawn(orchestration, vec![stage], repo, ops, 1).unwrap();
        handle.cancel("operator requested").await;

        let result = join.await.unwrap();
        assert!(matches!(result, Err(OrchestrationError::Cancelled(_, _))));
    }
}
