//! Optional embedded diagnostics endpoint.
//!
//! Exposes the live metrics registry and an on-demand CPU profile while
//! benchmarks are executing. The server's lifecycle is independent of any
//! single run and may span a whole sequence of them; it only ever reads the
//! registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use loadgen_core::MetricsRegistry;

/// Longest profile capture the endpoint will perform.
const MAX_PROFILE_SECONDS: u64 = 60;

/// Embedded HTTP server exposing metrics and profiling endpoints.
#[derive(Debug)]
pub struct DiagnosticsServer {
    registry: Arc<MetricsRegistry>,
    addr: SocketAddr,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DiagnosticsServer {
    /// Creates a server that will expose the given registry once started.
    pub fn new(registry: Arc<MetricsRegistry>, addr: SocketAddr) -> Self {
        Self {
            registry,
            addr,
            running: None,
        }
    }

    /// Binds and starts serving. Does nothing when already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind diagnostics server to {}", self.addr))?;
        let addr = listener.local_addr().unwrap_or(self.addr);

        let app = router(Arc::clone(&self.registry));
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "diagnostics server failed");
            }
        });

        tracing::info!("diagnostics server listening on {addr}");
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stops the server if it is running.
    ///
    /// Teardown problems are logged; stopping never fails the enclosing run.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(err) = running.handle.await {
            tracing::warn!(error = %err, "diagnostics server did not shut down cleanly");
        }
    }
}

fn router(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .route("/metrics", routing::get(metrics))
        .route("/profile", routing::get(profile))
        .with_state(registry)
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn metrics(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    Json(registry.snapshot())
}

#[derive(Debug, Deserialize)]
struct ProfileParams {
    /// How long to sample, in seconds.
    seconds: Option<u64>,
    /// Sampling frequency in Hertz.
    frequency: Option<i32>,
}

/// Captures a CPU profile and renders it as a flamegraph SVG.
async fn profile(Query(params): Query<ProfileParams>) -> Response {
    let seconds = params.seconds.unwrap_or(10).min(MAX_PROFILE_SECONDS);
    let frequency = params.frequency.unwrap_or(99);

    let result = tokio::task::spawn_blocking(move || capture_flamegraph(seconds, frequency)).await;
    match result {
        Ok(Ok(svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "profile capture failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn capture_flamegraph(seconds: u64, frequency: i32) -> Result<Vec<u8>> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(frequency)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;
    std::thread::sleep(Duration::from_secs(seconds));

    let report = guard.report().build()?;
    let mut svg = Vec::new();
    report.flamegraph(&mut svg)?;
    Ok(svg)
}
