//! Console rendering of final run summaries.

use std::time::Duration;

use bytesize::ByteSize;
use yansi::Paint;

use crate::metrics::OperationSummary;
use crate::runner::{RunOutcome, RunReport};

/// Prints the final summary for a finished run.
///
/// Always prints, including for aborted and cancelled runs, using whatever
/// metrics were collected up to that point.
pub fn print_report(report: &RunReport) {
    println!();
    println!(
        "{} {} ({} tasks in {:.2?})",
        "## Workload".bold(),
        report.workload.bold().blue(),
        report.attempted.bold(),
        report.elapsed,
    );

    match &report.outcome {
        RunOutcome::Completed => {}
        RunOutcome::Cancelled => {
            println!("{}", "run cancelled, results are partial".bold().yellow());
        }
        RunOutcome::Aborted(err) => {
            println!("{}", format!("run aborted: {err}").bold().red());
        }
    }

    for (operation, summary) in report.snapshot.operations(&report.workload) {
        print_operation(operation, summary, report.elapsed);
    }

    println!();
    print!(
        "{} {} succeeded, {} failed",
        "## TOTALS".bold(),
        report.succeeded.bold().green(),
        if report.failed > 0 {
            format!("{}", report.failed.bold().red())
        } else {
            report.failed.to_string()
        },
    );
    println!(", {:.2} tasks/s", report.throughput.bold());
}

fn print_operation(operation: &str, summary: &OperationSummary, elapsed: Duration) {
    let count = summary.successes + summary.failures;
    print!(
        "{} ({} ops",
        format!("{}:", operation.to_uppercase()).bold().green(),
        summary.successes.bold()
    );
    if summary.failures > 0 {
        print!(
            ", {}",
            format!("{} FAILURES", summary.failures).bold().red()
        );
    }
    println!(")");

    if elapsed.is_zero() || count == 0 {
        return;
    }

    let ops_ps = count as f64 / elapsed.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
    if summary.bytes > 0 {
        let throughput = (summary.bytes as f64 / elapsed.as_secs_f64()) as u64;
        print!(", {:.2}/s", ByteSize::b(throughput).bold());
    }
    println!();
    println!(
        "  avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
        summary.avg.bold(),
        summary.p50,
        summary.p90,
        summary.p99
    );
}
