//! Process-wide accumulation of per-operation benchmark metrics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use sketches_ddsketch::DDSketch;

type WorkloadEntries = HashMap<String, Arc<Mutex<MetricEntry>>>;

/// Accumulates counts and timing per `(workload, operation)` pair.
///
/// Updates to different keys do not contend: the key map is only read-locked
/// on the hot path and every entry is guarded by its own mutex. Recording
/// never fails; under extreme load precision degrades through the timing
/// sketch, not through errors.
#[derive(Default)]
pub struct MetricsRegistry {
    entries: RwLock<HashMap<String, WorkloadEntries>>,
}

#[derive(Default)]
struct MetricEntry {
    successes: u64,
    failures: u64,
    bytes: u64,
    total_duration: Duration,
    timing: DDSketch,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one observation for the given workload and operation.
    pub fn record(
        &self,
        workload: &str,
        operation: &str,
        duration: Duration,
        bytes: u64,
        success: bool,
    ) {
        let entry = self.entry(workload, operation);
        let mut entry = entry.lock().unwrap();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        entry.bytes += bytes;
        entry.total_duration += duration;
        entry.timing.add(duration.as_secs_f64());
    }

    fn entry(&self, workload: &str, operation: &str) -> Arc<Mutex<MetricEntry>> {
        {
            let entries = self.entries.read().unwrap();
            if let Some(entry) = entries.get(workload).and_then(|ops| ops.get(operation)) {
                return Arc::clone(entry);
            }
        }

        let mut entries = self.entries.write().unwrap();
        let ops = entries.entry(workload.to_owned()).or_default();
        Arc::clone(ops.entry(operation.to_owned()).or_default())
    }

    /// Takes a point-in-time copy of all current entries.
    ///
    /// Each entry is consistent in itself; `record` is only blocked for the
    /// duration of a single entry copy.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let entries = self.entries.read().unwrap();
        let workloads = entries
            .iter()
            .map(|(workload, ops)| {
                let ops = ops
                    .iter()
                    .map(|(operation, entry)| {
                        let entry = entry.lock().unwrap();
                        (operation.clone(), entry.summarize())
                    })
                    .collect();
                (workload.clone(), ops)
            })
            .collect();

        MetricsSnapshot { workloads }
    }

    /// Drops all entries recorded for the given workload.
    ///
    /// Used between independent runs of the same workload in one process.
    pub fn reset(&self, workload: &str) {
        self.entries.write().unwrap().remove(workload);
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap();
        f.debug_struct("MetricsRegistry")
            .field("workloads", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MetricEntry {
    fn summarize(&self) -> OperationSummary {
        let count = self.successes + self.failures;
        let quantile = |q| {
            self.timing
                .quantile(q)
                .ok()
                .flatten()
                .map(Duration::from_secs_f64)
                .unwrap_or_default()
        };

        OperationSummary {
            successes: self.successes,
            failures: self.failures,
            bytes: self.bytes,
            total_duration: self.total_duration,
            avg: if count > 0 {
                self.total_duration.div_f64(count as f64)
            } else {
                Duration::ZERO
            },
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        }
    }
}

/// Aggregated counters and latency quantiles for one operation.
#[derive(Clone, Debug, Serialize)]
pub struct OperationSummary {
    /// Number of successful tasks.
    pub successes: u64,
    /// Number of failed tasks, including abandoned ones.
    pub failures: u64,
    /// Total bytes moved.
    pub bytes: u64,
    /// Cumulative wall-clock time spent in the operation.
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
    /// Mean task duration.
    #[serde(with = "humantime_serde")]
    pub avg: Duration,
    /// Median task duration.
    #[serde(with = "humantime_serde")]
    pub p50: Duration,
    /// 90th percentile task duration.
    #[serde(with = "humantime_serde")]
    pub p90: Duration,
    /// 99th percentile task duration.
    #[serde(with = "humantime_serde")]
    pub p99: Duration,
}

/// Immutable point-in-time view of the registry.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Summaries nested as workload name, then operation name.
    pub workloads: BTreeMap<String, BTreeMap<String, OperationSummary>>,
}

impl MetricsSnapshot {
    /// Operation summaries recorded for the given workload, in name order.
    pub fn operations(&self, workload: &str) -> impl Iterator<Item = (&str, &OperationSummary)> {
        self.workloads
            .get(workload)
            .into_iter()
            .flatten()
            .map(|(op, summary)| (op.as_str(), summary))
    }

    /// Total successes and failures recorded for the given workload.
    pub fn totals(&self, workload: &str) -> (u64, u64) {
        self.operations(workload)
            .fold((0, 0), |(successes, failures), (_, summary)| {
                (successes + summary.successes, failures + summary.failures)
            })
    }

    /// Total bytes moved by the given workload.
    pub fn bytes(&self, workload: &str) -> u64 {
        self.operations(workload)
            .map(|(_, summary)| summary.bytes)
            .sum()
    }
}
