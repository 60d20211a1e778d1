//! Prometheus metrics endpoint.
//!
//! Serves `/metrics`, `/health`, `/ready` and `/status` while a run is in
//! progress. Only started when a metrics address is configured. `/ready`
//! answers 503 until collection discovery has finished; `/status` reports
//! how far the run has got.

use axum::{Extension, Json, Router, http::StatusCode, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use snafu::prelude::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::events::PipelineStatus;
use crate::error::{MetricsError, PrometheusInitSnafu};

/// Progress of the current run, fed by internal events.
pub static RUN_STATE: RunState = RunState::new();

/// Counters behind `/ready` and `/status`.
#[derive(Debug, Default)]
pub struct RunState {
    discovered: AtomicBool,
    collections: AtomicUsize,
    succeeded: AtomicUsize,
    incomplete: AtomicUsize,
}

/// Snapshot of [`RunState`] as served by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub phase: &'static str,
    pub collections: usize,
    pub succeeded: usize,
    pub incomplete: usize,
}

impl RunState {
    pub const fn new() -> Self {
        Self {
            discovered: AtomicBool::new(false),
            collections: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            incomplete: AtomicUsize::new(0),
        }
    }

    pub fn record_discovered(&self, count: usize) {
        self.collections.store(count, Ordering::Relaxed);
        self.discovered.store(true, Ordering::Release);
    }

    pub fn record_finished(&self, status: PipelineStatus) {
        let counter = match status {
            PipelineStatus::Success => &self.succeeded,
            PipelineStatus::Failed | PipelineStatus::Aborted | PipelineStatus::Skipped => {
                &self.incomplete
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.discovered.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RunStatus {
        let collections = self.collections.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let incomplete = self.incomplete.load(Ordering::Relaxed);
        let phase = if !self.is_ready() {
            "discovering"
        } else if succeeded + incomplete < collections {
            "running"
        } else {
            "finished"
        };
        RunStatus {
            phase,
            collections,
            succeeded,
            incomplete,
        }
    }
}

/// Install the Prometheus recorder and serve it on `addr` in the background.
pub fn init(addr: SocketAddr) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(run_server(addr, router(handle, &RUN_STATE)));

    Ok(())
}

fn router(handle: PrometheusHandle, state: &'static RunState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .layer(Extension(handle))
        .layer(Extension(state))
}

async fn run_server(addr: SocketAddr, app: Router) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    info!("Metrics endpoint listening on http://{}/metrics", addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}

async fn ready_handler(
    Extension(state): Extension<&'static RunState>,
) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "discovering\n")
    }
}

async fn status_handler(Extension(state): Extension<&'static RunState>) -> Json<RunStatus> {
    Json(state.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked() -> &'static RunState {
        Box::leak(Box::new(RunState::new()))
    }

    #[test]
    fn test_phases() {
        let state = RunState::new();
        assert_eq!(state.snapshot().phase, "discovering");

        state.record_discovered(2);
        assert_eq!(state.snapshot().phase, "running");

        state.record_finished(PipelineStatus::Success);
        state.record_finished(PipelineStatus::Skipped);
        assert_eq!(
            state.snapshot(),
            RunStatus {
                phase: "finished",
                collections: 2,
                succeeded: 1,
                incomplete: 1,
            }
        );
    }

    #[test]
    fn test_empty_run_finishes_at_discovery() {
        let state = RunState::new();
        state.record_discovered(0);
        assert_eq!(state.snapshot().phase, "finished");
    }

    #[tokio::test]
    async fn test_ready_waits_for_discovery() {
        let state = leaked();
        let (status, _) = ready_handler(Extension(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.record_discovered(1);
        let (status, _) = ready_handler(Extension(state)).await;
        assert_eq!(status, StatusCode::OK);

        let Json(status) = status_handler(Extension(state)).await;
        assert_eq!(status.phase, "running");
        assert_eq!(status.collections, 1);
    }
}
