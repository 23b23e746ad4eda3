//! Configuration for the load generator.
//!
//! Configuration can be loaded from multiple sources with the following
//! precedence (highest to lowest):
//!
//! 1. Environment variables (prefixed with `LOADGEN__`, double underscores
//!    denote nesting, e.g. `LOADGEN__TARGET__PATH=/data`)
//! 2. YAML configuration file (specified via `-c` or `--config`)
//! 3. Defaults
//!
//! Command line flags override the run-related fields on top of this.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "LOADGEN__";

/// Top-level configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Number of concurrent workers when the CLI does not override it.
    pub concurrency: usize,

    /// Number of tasks per run when neither a task count nor a duration is
    /// given on the command line.
    pub tasks: u64,

    /// Abort a run after this many consecutive task failures.
    pub fail_threshold: Option<u32>,

    /// Sampling interval of the progress reporter.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,

    /// How long in-flight tasks may keep running after cancellation before
    /// they are abandoned.
    #[serde(with = "humantime_serde")]
    pub drain_grace: Duration,

    /// Bind address of the optional diagnostics server.
    pub diagnostics_addr: SocketAddr,

    /// Payload size distribution shared by payload-producing workloads.
    pub payload: PayloadConfig,

    /// Targets the built-in workloads run against.
    pub target: TargetConfig,

    /// Shape of the trees built by the `dir-tree` workload.
    pub dir_tree: DirTreeConfig,

    /// Optional Sentry error reporting and tracing.
    pub sentry: Option<SentryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            tasks: 1000,
            fail_threshold: None,
            report_interval: Duration::from_secs(1),
            drain_grace: Duration::from_secs(5),
            diagnostics_addr: SocketAddr::from(([127, 0, 0, 1], 9884)),
            payload: PayloadConfig::default(),
            target: TargetConfig::default(),
            dir_tree: DirTreeConfig::default(),
            sentry: None,
        }
    }
}

/// Payload sizes follow a log-normal distribution pinned at these quantiles.
///
/// This models the real-world blob population: many small objects with a
/// long tail of large ones.
#[derive(Debug, Deserialize, Serialize)]
pub struct PayloadConfig {
    /// Median payload size.
    pub p50: ByteSize,
    /// 99th percentile payload size.
    pub p99: ByteSize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            p50: ByteSize::kib(16),
            p99: ByteSize::mib(1),
        }
    }
}

/// Targets the built-in workloads run against.
#[derive(Debug, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Directory the filesystem workloads write into.
    pub path: PathBuf,
    /// Base URL of the remote storage endpoint for HTTP workloads.
    pub remote: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("loadgen"),
            remote: None,
        }
    }
}

/// Shape of the trees built by the `dir-tree` workload.
#[derive(Debug, Deserialize, Serialize)]
pub struct DirTreeConfig {
    /// Nesting depth of each generated directory chain.
    pub depth: u32,
    /// Child directories per level.
    pub span: u32,
}

impl Default for DirTreeConfig {
    fn default() -> Self {
        Self { depth: 5, span: 10 }
    }
}

/// Sentry error reporting and tracing.
#[derive(Debug, Deserialize, Serialize)]
pub struct SentryConfig {
    /// The DSN events are sent to.
    pub dsn: String,
    /// Error sample rate.
    pub sample_rate: Option<f32>,
    /// Trace sample rate.
    pub traces_sample_rate: Option<f32>,
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file, and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_usable() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config.concurrency, 10);
            assert_eq!(config.tasks, 1000);
            assert_eq!(config.report_interval, Duration::from_secs(1));
            assert!(config.target.remote.is_none());
            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LOADGEN__CONCURRENCY", "32");
            jail.set_env("LOADGEN__REPORT_INTERVAL", "250ms");
            jail.set_env("LOADGEN__PAYLOAD__P50", "64KiB");
            jail.set_env("LOADGEN__TARGET__REMOTE", "http://localhost:8888");
            jail.set_env("LOADGEN__SENTRY__DSN", "abcde");

            let config = Config::load(None).unwrap();
            assert_eq!(config.concurrency, 32);
            assert_eq!(config.report_interval, Duration::from_millis(250));
            assert_eq!(config.payload.p50, ByteSize::kib(64));
            assert_eq!(
                config.target.remote.as_deref(),
                Some("http://localhost:8888")
            );
            assert_eq!(config.sentry.unwrap().dsn, "abcde");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            tasks: 50000
            drain_grace: 10s
            diagnostics_addr: 0.0.0.0:9000
            payload:
                p50: 1KiB
                p99: 32KiB
            dir_tree:
                depth: 3
                span: 4
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.tasks, 50000);
            assert_eq!(config.drain_grace, Duration::from_secs(10));
            assert_eq!(config.diagnostics_addr, "0.0.0.0:9000".parse().unwrap());
            assert_eq!(config.payload.p99, ByteSize::kib(32));
            assert_eq!(config.dir_tree.depth, 3);
            assert_eq!(config.dir_tree.span, 4);
            Ok(())
        });
    }
}
