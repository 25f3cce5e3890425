pub mod cancellation;

pub use cancellation::RunCancellationToken;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::task::JoinSet;

use crate::harness::cancellation::CancelOnPanic;
use crate::lifecycle::{self, ACTIONS_PER_LIFECYCLE};
use crate::models::{CoreError, CoreErrorKind, CoreResult, Task, TaskAction};
use crate::persistence::{PersistenceResult, TaskBackend};
use crate::report::RunReport;

pub type HarnessResult<T> = CoreResult<T>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HarnessPlan {
    pub workers: usize,
    pub repetitions: usize,
}

impl HarnessPlan {
    pub fn new(workers: usize, repetitions: usize) -> HarnessResult<Self> {
        let plan = Self {
            workers,
            repetitions,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.workers == 0 || self.repetitions == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "harness needs at least one worker and one repetition (workers={}, repetitions={})",
                    self.workers, self.repetitions
                ),
            ));
        }
        Ok(())
    }

    pub fn tasks(&self) -> u64 {
        (self.workers as u64).saturating_mul(self.repetitions as u64)
    }

    pub fn actions(&self) -> u64 {
        self.tasks().saturating_mul(ACTIONS_PER_LIFECYCLE as u64)
    }
}

/// Wraps the shared backend and counts every action that succeeds.
struct CountingBackend {
    inner: Arc<dyn TaskBackend>,
    actions: AtomicU64,
}

impl TaskBackend for CountingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn apply(&self, action: TaskAction, task: &Task) -> PersistenceResult<()> {
        self.inner.apply(action, task)?;
        self.actions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub async fn run_concurrent(
    label: &str,
    backend: Arc<dyn TaskBackend>,
    plan: HarnessPlan,
) -> HarnessResult<RunReport> {
    run_concurrent_with_token(label, backend, plan, RunCancellationToken::new()).await
}

/// Runs `plan.workers` parallel workers, each driving `plan.repetitions`
/// lifecycles against the shared backend, and waits for all of them.
///
/// The first failing worker cancels `token`; the remaining workers stop
/// before their next lifecycle and the root-cause error is returned.
pub async fn run_concurrent_with_token(
    label: &str,
    backend: Arc<dyn TaskBackend>,
    plan: HarnessPlan,
    token: RunCancellationToken,
) -> HarnessResult<RunReport> {
    plan.validate()?;
    let backend_name = backend.name();
    let counting = Arc::new(CountingBackend {
        inner: backend,
        actions: AtomicU64::new(0),
    });

    tracing::info!(
        label,
        backend = backend_name,
        workers = plan.workers,
        repetitions = plan.repetitions,
        "starting run"
    );

    let started = Instant::now();
    let mut workers = JoinSet::new();
    for worker in 0..plan.workers {
        let backend = counting.clone();
        let token = token.clone();
        workers.spawn_blocking(move || {
            run_worker(worker, backend.as_ref(), plan.repetitions, &token)
        });
    }

    let mut failure: Option<CoreError> = None;
    let mut completed_tasks: u64 = 0;
    while let Some(joined) = workers.join_next().await {
        let error = match joined {
            Ok(Ok(tasks)) => {
                completed_tasks += tasks;
                continue;
            }
            Ok(Err(error)) => error,
            Err(join_error) => CoreError {
                backend: Some(backend_name),
                action: None,
                task_id: None,
                kind: CoreErrorKind::WorkerPanicked,
                message: format!("{backend_name} worker panicked: {join_error}"),
            },
        };
        token.cancel();
        failure = Some(match failure.take() {
            Some(existing) if existing.kind != CoreErrorKind::Cancelled => existing,
            _ => error,
        });
    }
    let elapsed = started.elapsed();

    if let Some(error) = failure {
        tracing::error!(
            label,
            backend = backend_name,
            kind = ?error.kind,
            message = %error.message,
            "run aborted"
        );
        return Err(error);
    }

    let report = RunReport {
        label: label.to_string(),
        backend: backend_name,
        workers: plan.workers,
        repetitions: plan.repetitions,
        tasks: completed_tasks,
        actions: counting.actions.load(Ordering::SeqCst),
        elapsed,
    };
    tracing::debug!(
        label,
        backend = backend_name,
        tasks = report.tasks,
        actions = report.actions,
        elapsed_ms = elapsed.as_millis() as u64,
        "run finished"
    );
    Ok(report)
}

fn run_worker(
    worker: usize,
    backend: &dyn TaskBackend,
    repetitions: usize,
    token: &RunCancellationToken,
) -> HarnessResult<u64> {
    let _guard = CancelOnPanic::new(token);
    let mut completed = 0;
    for _ in 0..repetitions {
        if token.is_cancelled() {
            let mut error = CoreError::new(
                CoreErrorKind::Cancelled,
                format!("worker {worker} stopped after {completed} lifecycles"),
            );
            error.backend = Some(backend.name());
            return Err(error);
        }

        if let Err(error) = lifecycle::simulate(backend) {
            token.cancel();
            tracing::error!(
                worker,
                backend = backend.name(),
                kind = ?error.kind,
                action = ?error.action,
                task_id = ?error.task_id,
                message = %error.message,
                "lifecycle failed, cancelling run"
            );
            return Err(error);
        }
        completed += 1;
    }
    Ok(completed)
}
