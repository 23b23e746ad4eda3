//! Command line interface and process bootstrap.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use argh::FromArgs;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use loadgen_core::{
    ConsoleMode, MetricsRegistry, RunBound, RunController, RunOptions, RunOutcome, report,
};

use crate::config::Config;
use crate::diagnostics::DiagnosticsServer;
use crate::{observability, workloads};

/// Load generator and performance testing tool for storage clusters.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    List(ListCommand),
    Version(VersionCommand),
}

/// run one or more workloads in sequence
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// names of the workloads to run, in order
    #[argh(positional)]
    workloads: Vec<String>,

    /// number of concurrent workers
    #[argh(option, short = 't')]
    threads: Option<usize>,

    /// total number of tasks to dispatch per workload
    #[argh(option, short = 'n')]
    tasks: Option<u64>,

    /// run each workload for this long instead of a fixed task count (e.g. "30s")
    #[argh(option, short = 'd')]
    duration: Option<humantime::Duration>,

    /// enable the embedded diagnostics server
    #[argh(switch)]
    server: bool,

    /// abort after this many consecutive task failures
    #[argh(option)]
    fail_threshold: Option<u32>,

    /// progress reporting interval (e.g. "1s")
    #[argh(option)]
    interval: Option<humantime::Duration>,
}

/// list the available workloads
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCommand {}

/// print the loadgen version
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    if let Command::List(_) = args.command {
        for (name, description) in workloads::builtin().iter() {
            println!("{name:<16} {description}");
        }
        return Ok(());
    }

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let Command::Run(command) = args.command else {
        unreachable!()
    };
    runtime.block_on(run(config, command))
}

async fn run(config: Config, command: RunCommand) -> Result<()> {
    if command.workloads.is_empty() {
        bail!("no workload given; see `loadgen list`");
    }

    let bound = match (command.tasks, command.duration) {
        (Some(_), Some(_)) => bail!("--tasks and --duration are mutually exclusive"),
        (None, Some(duration)) => RunBound::Duration(duration.into()),
        (Some(tasks), None) => RunBound::Tasks(tasks),
        (None, None) => RunBound::Tasks(config.tasks),
    };

    let options = RunOptions {
        concurrency: command.threads.unwrap_or(config.concurrency),
        bound,
        fail_threshold: command.fail_threshold.or(config.fail_threshold),
        drain_grace: config.drain_grace,
        report_interval: command
            .interval
            .map(Into::into)
            .unwrap_or(config.report_interval),
        // Resolved once here; the choice never changes mid-run.
        console: ConsoleMode::detect(),
    };

    let registry = Arc::new(MetricsRegistry::new());
    let available = workloads::builtin();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            elegant_departure::tokio::depart()
                .on_termination()
                .on_sigint()
                .on_signal(SignalKind::hangup())
                .on_signal(SignalKind::quit())
                .await;
            cancel.cancel();
        });
    }

    // The diagnostics server outlives individual runs; it is stopped
    // unconditionally once the whole sequence is done.
    let mut diagnostics = DiagnosticsServer::new(Arc::clone(&registry), config.diagnostics_addr);
    if command.server {
        if let Err(err) = diagnostics.start().await {
            tracing::error!(error = %err, "diagnostics server could not be started");
        }
    }

    let mut controller = RunController::new(Arc::clone(&registry));
    let mut result = Ok(());
    for name in &command.workloads {
        let unit = match available.resolve(name, &config) {
            Ok(unit) => unit,
            Err(err) => {
                result = Err(err);
                break;
            }
        };

        let run_report = controller
            .run(name, unit, options.clone(), cancel.clone())
            .await;
        report::print_report(&run_report);

        match run_report.outcome {
            RunOutcome::Completed => {}
            RunOutcome::Cancelled => break,
            RunOutcome::Aborted(err) => {
                result = Err(err.into());
                break;
            }
        }
    }

    diagnostics.stop().await;
    result
}
