//! Orchestration of a single benchmark run.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RunError;
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::progress::{ConsoleMode, ProgressReporter};
use crate::scheduler::{self, RunBound, SchedulerOptions, SchedulerRun, Termination};
use crate::workload::WorkloadUnit;

/// Options for one benchmark run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Task-count or wall-clock bound.
    pub bound: RunBound,
    /// Abort the run after this many consecutive task failures.
    pub fail_threshold: Option<u32>,
    /// How long in-flight tasks may keep running after cancellation.
    pub drain_grace: Duration,
    /// Sampling interval of the progress reporter.
    pub report_interval: Duration,
    /// How progress is rendered.
    pub console: ConsoleMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            bound: RunBound::Tasks(1000),
            fail_threshold: None,
            drain_grace: Duration::from_secs(5),
            report_interval: Duration::from_secs(1),
            console: ConsoleMode::Plain,
        }
    }
}

/// Lifecycle state of the run controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// No run is active; a new workload can be selected.
    Idle,
    /// The workload's `prepare` hook is executing.
    Preparing,
    /// Workers are dispatching tasks.
    Running,
    /// The last run finished normally.
    Completed,
    /// The last run was aborted by a setup error or the failure threshold.
    Aborted,
    /// The last run was cancelled externally.
    Cancelled,
}

/// Terminal outcome of a run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The bound was exhausted or the duration elapsed.
    Completed,
    /// An external cancellation stopped the run; in-flight tasks were
    /// drained and the collected metrics are partial.
    Cancelled,
    /// Setup failed or the failure threshold was crossed.
    Aborted(RunError),
}

impl RunOutcome {
    /// Whether the run ended in the aborted state.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Final aggregate of one run, derived from the metrics registry once a
/// terminal state is reached.
#[derive(Debug)]
pub struct RunReport {
    /// Name of the workload that ran.
    pub workload: String,
    /// Wall-clock time from prepare to the terminal state.
    pub elapsed: Duration,
    /// Number of tasks dispatched.
    pub attempted: u64,
    /// Number of tasks that succeeded.
    pub succeeded: u64,
    /// Number of tasks that failed.
    pub failed: u64,
    /// Tasks per second over the whole run.
    pub throughput: f64,
    /// Per-operation metrics collected during the run.
    pub snapshot: MetricsSnapshot,
    /// How the run ended.
    pub outcome: RunOutcome,
}

/// Drives workload units through preparation, scheduling, and cleanup.
///
/// The controller owns the state machine of a run and is the only writer of
/// the metrics registry wiring; reporters and diagnostics see the registry
/// read-only.
#[derive(Debug)]
pub struct RunController {
    registry: Arc<MetricsRegistry>,
    state: RunState,
}

impl RunController {
    /// Creates a controller recording into the given registry.
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            state: RunState::Idle,
        }
    }

    /// The metrics registry shared with reporters and diagnostics.
    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// The current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the unit to a terminal state and returns the summary.
    ///
    /// A summary is produced on every terminal path, including aborts and
    /// cancellations, from whatever metrics were collected. The controller
    /// returns to [`RunState::Idle`] afterwards so another workload can be
    /// selected in the same process.
    pub async fn run(
        &mut self,
        name: &str,
        unit: Box<dyn WorkloadUnit>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        let span = tracing::info_span!(
            "run",
            workload = name,
            concurrency = options.concurrency,
        );
        let report = self.drive(name, unit, options, cancel).instrument(span).await;
        self.state = RunState::Idle;
        report
    }

    async fn drive(
        &mut self,
        name: &str,
        mut unit: Box<dyn WorkloadUnit>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        self.state = RunState::Preparing;
        // Metrics for a workload restart from zero on every run.
        self.registry.reset(name);
        let started = Instant::now();

        if let Err(err) = unit.prepare().await {
            tracing::error!(workload = name, error = %err, "workload preparation failed");
            self.state = RunState::Aborted;
            let result = SchedulerRun {
                dispatched: 0,
                succeeded: 0,
                failed: 0,
                termination: Termination::Exhausted,
            };
            return self.report(name, started, result, RunOutcome::Aborted(err.into()));
        }

        self.state = RunState::Running;
        tracing::info!(workload = name, bound = ?options.bound, "starting benchmark run");

        let reporter = ProgressReporter::start(
            Arc::clone(&self.registry),
            name.to_owned(),
            options.bound,
            options.report_interval,
            options.console,
        );

        let registry = Arc::clone(&self.registry);
        let workload = name.to_owned();
        let mut unit: Arc<dyn WorkloadUnit> = Arc::from(unit);
        let result = scheduler::run(
            Arc::clone(&unit),
            SchedulerOptions {
                concurrency: options.concurrency,
                bound: options.bound,
                fail_threshold: options.fail_threshold,
                drain_grace: options.drain_grace,
            },
            cancel,
            move |completion| {
                registry.record(
                    &workload,
                    completion.operation.as_ref(),
                    completion.duration,
                    completion.bytes,
                    completion.success,
                );
            },
        )
        .await;

        reporter.stop().await;

        // All workers are joined at this point, so the unit is exclusively
        // ours again and cleanup runs exactly once.
        match Arc::get_mut(&mut unit) {
            Some(unit) => {
                if let Err(err) = unit.cleanup().await {
                    // Teardown failures never override the run outcome.
                    tracing::error!(workload = name, error = %err, "workload cleanup failed");
                }
            }
            None => tracing::warn!(workload = name, "workload unit still shared, skipping cleanup"),
        }

        let outcome = match result.termination {
            Termination::Exhausted | Termination::Elapsed => {
                self.state = RunState::Completed;
                RunOutcome::Completed
            }
            Termination::Cancelled => {
                self.state = RunState::Cancelled;
                RunOutcome::Cancelled
            }
            Termination::FailureThreshold => {
                self.state = RunState::Aborted;
                RunOutcome::Aborted(RunError::ThresholdExceeded {
                    failures: options.fail_threshold.unwrap_or_default(),
                })
            }
        };

        self.report(name, started, result, outcome)
    }

    fn report(
        &self,
        name: &str,
        started: Instant,
        result: SchedulerRun,
        outcome: RunOutcome,
    ) -> RunReport {
        let elapsed = started.elapsed();
        let throughput = if elapsed.is_zero() {
            0.0
        } else {
            result.dispatched as f64 / elapsed.as_secs_f64()
        };

        RunReport {
            workload: name.to_owned(),
            elapsed,
            attempted: result.dispatched,
            succeeded: result.succeeded,
            failed: result.failed,
            throughput,
            snapshot: self.registry.snapshot(),
            outcome,
        }
    }
}
