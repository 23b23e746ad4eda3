//! Load generator and performance testing tool for storage clusters.
//!
//! A single binary dispatches to one of the built-in workload units (see
//! `loadgen list`) and drives it through the benchmark engine in
//! [`loadgen_core`] at a configured concurrency and task or duration bound.
//! Progress is reported live, a summary is printed at the end of every run,
//! and an optional embedded diagnostics server exposes the live metrics and
//! CPU profiles while benchmarks execute.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod observability;
pub mod workloads;
