//! Error taxonomy for benchmark runs.
//!
//! Task failures stay contained in the scheduler and only surface in
//! aggregate through the metrics, while setup failures and a crossed failure
//! threshold terminate the run. Teardown failures are logged and never
//! override an outcome that was already reached.

use std::borrow::Cow;

use thiserror::Error;

/// Fatal error raised by a workload's `prepare` hook.
///
/// A setup error aborts the run before any task is dispatched.
#[derive(Debug, Error)]
#[error("workload setup failed: {inner}")]
pub struct SetupError {
    inner: anyhow::Error,
}

impl SetupError {
    /// Wraps the underlying cause.
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self { inner: err.into() }
    }
}

impl From<anyhow::Error> for SetupError {
    fn from(err: anyhow::Error) -> Self {
        Self { inner: err }
    }
}

/// Error raised by a single task execution.
///
/// A task error is recorded as a failed metric entry and does not stop the
/// run on its own, only through the configured failure threshold.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The workload operation itself failed.
    #[error("{operation} failed: {inner}")]
    Failed {
        /// Operation name the failure is recorded under.
        operation: Cow<'static, str>,
        /// The underlying cause.
        inner: anyhow::Error,
    },
    /// The task was still running when the cancellation grace period ended.
    #[error("task abandoned during cancellation")]
    Abandoned,
}

impl TaskError {
    /// Wraps a failure of the named operation.
    pub fn new(operation: impl Into<Cow<'static, str>>, err: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            operation: operation.into(),
            inner: err.into(),
        }
    }

    /// The operation name this failure is recorded under.
    pub fn operation(&self) -> &str {
        match self {
            Self::Failed { operation, .. } => operation,
            Self::Abandoned => "abandoned",
        }
    }
}

/// Error raised by a workload's `cleanup` hook or by diagnostics teardown.
///
/// Logged by the run controller; never overrides the run outcome.
#[derive(Debug, Error)]
#[error("workload teardown failed: {inner}")]
pub struct TeardownError {
    inner: anyhow::Error,
}

impl TeardownError {
    /// Wraps the underlying cause.
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self { inner: err.into() }
    }
}

impl From<anyhow::Error> for TeardownError {
    fn from(err: anyhow::Error) -> Self {
        Self { inner: err }
    }
}

/// Terminal error of a benchmark run, reported as the `Aborted` outcome.
#[derive(Debug, Error)]
pub enum RunError {
    /// The workload's `prepare` hook failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// The configured failure threshold was crossed.
    #[error("aborted after {failures} consecutive task failures")]
    ThresholdExceeded {
        /// The threshold that was crossed.
        failures: u32,
    },
}
