//! Live reporting of run progress.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsRegistry;
use crate::scheduler::RunBound;

/// How progress is rendered to the console.
///
/// Resolved once at startup and passed down; the mode never changes mid-run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsoleMode {
    /// Overwrite a single progress display in place.
    Interactive,
    /// Emit one log line per sampling tick, so log capture tools see a
    /// discrete history.
    Plain,
}

impl ConsoleMode {
    /// Picks the interactive mode when stderr is attached to a terminal.
    pub fn detect() -> Self {
        if std::io::stderr().is_terminal() {
            Self::Interactive
        } else {
            Self::Plain
        }
    }
}

/// Periodically samples the metrics registry and renders progress for one
/// running workload.
#[derive(Debug)]
pub struct ProgressReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Starts the sampling loop.
    pub fn start(
        registry: Arc<MetricsRegistry>,
        workload: String,
        bound: RunBound,
        interval: Duration,
        console: ConsoleMode,
    ) -> Self {
        let bar = match console {
            ConsoleMode::Interactive => Some(progress_bar(&workload, bound)),
            ConsoleMode::Plain => None,
        };
        let ticker = Ticker {
            registry,
            workload,
            bound,
            bar,
            started: Instant::now(),
            last_tick: Instant::now(),
            last_completed: 0,
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ticker.run(interval, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stops the loop and leaves the console in a clean state.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.ok();
    }
}

fn progress_bar(workload: &str, bound: RunBound) -> ProgressBar {
    let bar = match bound {
        RunBound::Tasks(total) => {
            let style = ProgressStyle::with_template("{msg}\n{wide_bar} {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(total).with_style(style)
        }
        RunBound::Duration(_) => {
            let style = ProgressStyle::with_template("{spinner} {msg} {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            ProgressBar::new_spinner().with_style(style)
        }
    };
    bar.set_message(format!("{workload}: starting"));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

struct Ticker {
    registry: Arc<MetricsRegistry>,
    workload: String,
    bound: RunBound,
    bar: Option<ProgressBar>,
    started: Instant,
    last_tick: Instant,
    last_completed: u64,
}

impl Ticker {
    async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = cancel.cancelled() => break,
            }
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn tick(&mut self) {
        let snapshot = self.registry.snapshot();
        let (successes, failures) = snapshot.totals(&self.workload);
        let completed = successes + failures;

        let now = Instant::now();
        let window = now.duration_since(self.last_tick);
        let rate = if window.is_zero() {
            0.0
        } else {
            (completed - self.last_completed) as f64 / window.as_secs_f64()
        };
        let ok_rate = if completed == 0 {
            100.0
        } else {
            successes as f64 * 100.0 / completed as f64
        };
        self.last_tick = now;
        self.last_completed = completed;

        if let Some(bar) = &self.bar {
            bar.set_position(completed);
            bar.set_message(format!(
                "{}: {ok_rate:.1}% ok, {rate:.1} ops/s",
                self.workload
            ));
        } else {
            match self.bound {
                RunBound::Tasks(total) => tracing::info!(
                    workload = %self.workload,
                    completed,
                    total,
                    ok = format_args!("{ok_rate:.1}%"),
                    rate = format_args!("{rate:.1}/s"),
                    "progress"
                ),
                RunBound::Duration(_) => tracing::info!(
                    workload = %self.workload,
                    completed,
                    elapsed = ?self.started.elapsed(),
                    ok = format_args!("{ok_rate:.1}%"),
                    rate = format_args!("{rate:.1}/s"),
                    "progress"
                ),
            }
        }
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("workload", &self.workload)
            .field("bound", &self.bound)
            .finish()
    }
}
