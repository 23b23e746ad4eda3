//! Concurrent task execution against a workload unit.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::TaskError;
use crate::workload::WorkloadUnit;

/// Bound on how much work a run dispatches.
#[derive(Clone, Copy, Debug)]
pub enum RunBound {
    /// Dispatch exactly this many tasks.
    Tasks(u64),
    /// Keep dispatching new tasks until this much time elapsed; tasks already
    /// in flight are allowed to finish.
    Duration(Duration),
}

/// Tuning for one scheduler run.
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Task-count or wall-clock bound.
    pub bound: RunBound,
    /// Stop dispatching after this many consecutive task failures.
    pub fail_threshold: Option<u32>,
    /// How long in-flight tasks may keep running after cancellation before
    /// they are abandoned.
    pub drain_grace: Duration,
}

/// Completion record for one dispatched task.
#[derive(Debug)]
pub struct TaskCompletion {
    /// The task index claimed for this execution.
    pub index: u64,
    /// Operation the task is recorded under.
    pub operation: Cow<'static, str>,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
    /// Bytes moved, if the operation reported any.
    pub bytes: u64,
    /// Whether the task succeeded.
    pub success: bool,
}

/// Why a scheduler run stopped dispatching.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// The task-count bound was exhausted.
    Exhausted,
    /// The duration bound elapsed.
    Elapsed,
    /// An external cancellation arrived.
    Cancelled,
    /// The consecutive-failure threshold was crossed.
    FailureThreshold,
}

/// Final tally of one scheduler run.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerRun {
    /// Number of tasks that were dispatched to the workload.
    pub dispatched: u64,
    /// Number of tasks that completed successfully.
    pub succeeded: u64,
    /// Number of tasks that failed, including abandoned ones.
    pub failed: u64,
    /// Why dispatching stopped.
    pub termination: Termination,
}

/// Drives the unit at the configured concurrency until the bound is reached,
/// the failure threshold is crossed, or `cancel` fires.
///
/// Task indices are claimed from a shared atomic counter, so no two workers
/// ever execute the same index and a task-count bound is exhausted exactly
/// once. Every dispatched task produces exactly one `on_result` call,
/// including tasks abandoned during cancellation.
pub async fn run(
    unit: Arc<dyn WorkloadUnit>,
    options: SchedulerOptions,
    cancel: CancellationToken,
    on_result: impl Fn(TaskCompletion) + Send + Sync + 'static,
) -> SchedulerRun {
    let limit = match options.bound {
        RunBound::Tasks(total) => Limit::Tasks(total),
        RunBound::Duration(duration) => Limit::Deadline(Instant::now() + duration),
    };

    let shared = Arc::new(Shared {
        limit,
        stop: cancel.child_token(),
        drain_grace: options.drain_grace,
        fail_threshold: options.fail_threshold,
        next: AtomicU64::new(0),
        dispatched: AtomicU64::new(0),
        succeeded: AtomicU64::new(0),
        failed: AtomicU64::new(0),
        consecutive_failures: AtomicU32::new(0),
        termination: Mutex::new(None),
        on_result: Box::new(on_result),
    });

    let workers: Vec<_> = (0..options.concurrency.max(1))
        .map(|_| {
            let unit = Arc::clone(&unit);
            let shared = Arc::clone(&shared);
            tokio::spawn(worker(unit, shared))
        })
        .collect();

    for worker in futures::future::join_all(workers).await {
        if let Err(err) = worker {
            tracing::error!(error = %err, "benchmark worker crashed");
        }
    }

    let termination = shared
        .termination
        .lock()
        .unwrap()
        .unwrap_or(Termination::Exhausted);

    SchedulerRun {
        dispatched: shared.dispatched.load(Ordering::Relaxed),
        succeeded: shared.succeeded.load(Ordering::Relaxed),
        failed: shared.failed.load(Ordering::Relaxed),
        termination,
    }
}

enum Limit {
    Tasks(u64),
    Deadline(Instant),
}

struct Shared {
    limit: Limit,
    stop: CancellationToken,
    drain_grace: Duration,
    fail_threshold: Option<u32>,
    next: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU32,
    termination: Mutex<Option<Termination>>,
    on_result: Box<dyn Fn(TaskCompletion) + Send + Sync>,
}

impl Shared {
    /// Claims the next task index, or `None` once dispatching should stop.
    ///
    /// A claimed index is always executed, which keeps the dispatched index
    /// sequence contiguous under every bound.
    fn claim(&self) -> Option<u64> {
        if self.stop.is_cancelled() {
            self.finish(Termination::Cancelled);
            return None;
        }

        match self.limit {
            Limit::Tasks(total) => {
                let index = self.next.fetch_add(1, Ordering::Relaxed);
                if index < total {
                    Some(index)
                } else {
                    self.finish(Termination::Exhausted);
                    None
                }
            }
            Limit::Deadline(deadline) => {
                if Instant::now() >= deadline {
                    self.finish(Termination::Elapsed);
                    None
                } else {
                    Some(self.next.fetch_add(1, Ordering::Relaxed))
                }
            }
        }
    }

    fn record(&self, completion: TaskCompletion) {
        if completion.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(threshold) = self.fail_threshold {
                if failures >= threshold {
                    self.finish(Termination::FailureThreshold);
                    self.stop.cancel();
                }
            }
        }
        (self.on_result)(completion);
    }

    /// Records why the run stopped; the first cause wins.
    fn finish(&self, termination: Termination) {
        self.termination.lock().unwrap().get_or_insert(termination);
    }

    /// Resolves once in-flight tasks should no longer be awaited: after
    /// cancellation plus the drain grace period.
    async fn abandon(&self) {
        self.stop.cancelled().await;
        tokio::time::sleep(self.drain_grace).await;
    }
}

async fn worker(unit: Arc<dyn WorkloadUnit>, shared: Arc<Shared>) {
    while let Some(index) = shared.claim() {
        shared.dispatched.fetch_add(1, Ordering::Relaxed);

        let span = tracing::trace_span!("task", index);
        let start = Instant::now();
        let result = tokio::select! {
            result = unit.execute(index).instrument(span) => result,
            _ = shared.abandon() => Err(TaskError::Abandoned),
        };
        let duration = start.elapsed();

        let completion = match result {
            Ok(outcome) => TaskCompletion {
                index,
                operation: outcome.operation,
                duration,
                bytes: outcome.bytes,
                success: true,
            },
            Err(err) => {
                tracing::debug!(index, error = %err, "task failed");
                let operation = match err {
                    TaskError::Failed { operation, .. } => operation,
                    TaskError::Abandoned => Cow::Borrowed("abandoned"),
                };
                TaskCompletion {
                    index,
                    operation,
                    duration,
                    bytes: 0,
                    success: false,
                }
            }
        };
        shared.record(completion);
    }
}

#[cfg(test)]
mod tests {
    use crate::workload::OperationOutcome;

    use super::*;

    #[derive(Debug)]
    struct Noop;

    #[async_trait::async_trait]
    impl WorkloadUnit for Noop {
        async fn execute(&self, _index: u64) -> Result<OperationOutcome, TaskError> {
            Ok(OperationOutcome::new("noop"))
        }
    }

    /// Records every claimed index; fails where the predicate says so.
    #[derive(Debug)]
    struct Recording {
        indices: Mutex<Vec<u64>>,
        fail_every: Option<u64>,
    }

    impl Recording {
        fn new(fail_every: Option<u64>) -> Self {
            Self {
                indices: Mutex::new(Vec::new()),
                fail_every,
            }
        }
    }

    #[async_trait::async_trait]
    impl WorkloadUnit for Recording {
        async fn execute(&self, index: u64) -> Result<OperationOutcome, TaskError> {
            self.indices.lock().unwrap().push(index);
            match self.fail_every {
                Some(n) if (index + 1) % n == 0 => {
                    Err(TaskError::new("op", anyhow::anyhow!("synthetic failure")))
                }
                _ => Ok(OperationOutcome::new("op")),
            }
        }
    }

    #[derive(Debug)]
    struct Slow(Duration);

    #[async_trait::async_trait]
    impl WorkloadUnit for Slow {
        async fn execute(&self, _index: u64) -> Result<OperationOutcome, TaskError> {
            tokio::time::sleep(self.0).await;
            Ok(OperationOutcome::new("slow"))
        }
    }

    #[derive(Debug)]
    struct AlwaysFail;

    #[async_trait::async_trait]
    impl WorkloadUnit for AlwaysFail {
        async fn execute(&self, _index: u64) -> Result<OperationOutcome, TaskError> {
            Err(TaskError::new("op", anyhow::anyhow!("boom")))
        }
    }

    fn options(concurrency: usize, bound: RunBound) -> SchedulerOptions {
        SchedulerOptions {
            concurrency,
            bound,
            fail_threshold: None,
            drain_grace: Duration::from_millis(100),
        }
    }

    fn collector() -> (
        Arc<Mutex<Vec<TaskCompletion>>>,
        impl Fn(TaskCompletion) + Send + Sync + 'static,
    ) {
        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completions);
        (completions, move |completion| {
            sink.lock().unwrap().push(completion)
        })
    }

    #[tokio::test]
    async fn completes_all_tasks() {
        let (completions, on_result) = collector();
        let run = run(
            Arc::new(Noop),
            options(4, RunBound::Tasks(100)),
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.dispatched, 100);
        assert_eq!(run.succeeded, 100);
        assert_eq!(run.failed, 0);
        assert_eq!(run.termination, Termination::Exhausted);
        assert_eq!(completions.lock().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn task_indices_are_unique_and_contiguous() {
        let unit = Arc::new(Recording::new(None));
        let (_completions, on_result) = collector();
        run(
            Arc::clone(&unit) as Arc<dyn WorkloadUnit>,
            options(8, RunBound::Tasks(500)),
            CancellationToken::new(),
            on_result,
        )
        .await;

        let mut indices = unit.indices.lock().unwrap().clone();
        indices.sort_unstable();
        assert_eq!(indices, (0..500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failures_are_recorded_but_do_not_stop_the_run() {
        let unit = Arc::new(Recording::new(Some(3)));
        let (completions, on_result) = collector();
        let run = run(
            unit as Arc<dyn WorkloadUnit>,
            options(2, RunBound::Tasks(9)),
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::Exhausted);
        assert_eq!(run.succeeded, 6);
        assert_eq!(run.failed, 3);
        let completions = completions.lock().unwrap();
        assert_eq!(completions.iter().filter(|c| !c.success).count(), 3);
    }

    #[tokio::test]
    async fn consecutive_failure_threshold_aborts() {
        let mut options = options(1, RunBound::Tasks(1000));
        options.fail_threshold = Some(5);
        let (completions, on_result) = collector();
        let run = run(
            Arc::new(AlwaysFail),
            options,
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::FailureThreshold);
        assert_eq!(run.dispatched, 5);
        assert_eq!(run.failed, 5);
        assert_eq!(completions.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn successes_reset_the_consecutive_counter() {
        // Every other task fails, so a threshold of 2 is never crossed.
        let mut options = options(1, RunBound::Tasks(10));
        options.fail_threshold = Some(2);
        let (_completions, on_result) = collector();
        let run = run(
            Arc::new(Recording::new(Some(2))),
            options,
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::Exhausted);
        assert_eq!(run.succeeded, 5);
        assert_eq!(run.failed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bound_stops_claiming() {
        let (_completions, on_result) = collector();
        let run = run(
            Arc::new(Slow(Duration::from_millis(10))),
            options(4, RunBound::Duration(Duration::from_millis(100))),
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::Elapsed);
        assert!(run.dispatched > 0);
        assert_eq!(run.succeeded, run.dispatched);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drains_in_flight_tasks() {
        let cancel = CancellationToken::new();
        let (completions, on_result) = collector();
        let handle = tokio::spawn(run(
            Arc::new(Slow(Duration::from_millis(50))) as Arc<dyn WorkloadUnit>,
            options(2, RunBound::Tasks(1000)),
            cancel.clone(),
            on_result,
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let run = handle.await.unwrap();

        assert_eq!(run.termination, Termination::Cancelled);
        assert!(run.dispatched < 1000);
        assert_eq!(run.succeeded + run.failed, run.dispatched);
        assert_eq!(completions.lock().unwrap().len() as u64, run.dispatched);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_tasks_are_recorded_as_failures() {
        let cancel = CancellationToken::new();
        let (completions, on_result) = collector();
        let mut opts = options(2, RunBound::Tasks(10));
        opts.drain_grace = Duration::from_millis(100);
        let handle = tokio::spawn(run(
            Arc::new(Slow(Duration::from_secs(3600))) as Arc<dyn WorkloadUnit>,
            opts,
            cancel.clone(),
            on_result,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let run = handle.await.unwrap();

        assert_eq!(run.termination, Termination::Cancelled);
        assert_eq!(run.dispatched, 2);
        assert_eq!(run.failed, 2);
        let completions = completions.lock().unwrap();
        assert!(completions.iter().all(|c| c.operation == "abandoned"));
    }

    #[tokio::test]
    async fn pre_cancelled_token_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (completions, on_result) = collector();

        let run = run(
            Arc::new(Noop),
            options(4, RunBound::Tasks(100)),
            cancel,
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::Cancelled);
        assert_eq!(run.dispatched, 0);
        assert!(completions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_tasks_complete_immediately() {
        let (_completions, on_result) = collector();
        let run = run(
            Arc::new(Noop),
            options(4, RunBound::Tasks(0)),
            CancellationToken::new(),
            on_result,
        )
        .await;

        assert_eq!(run.termination, Termination::Exhausted);
        assert_eq!(run.dispatched, 0);
    }
}
