//! HTTP endpoint for Prometheus scraping

use crate::error::Result;
use crate::telemetry::Metrics;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ServerState {
    metrics: Metrics,
    run_id: Uuid,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Run identifier
    pub run_id: Uuid,
}

/// Bound listener serving `/metrics` and `/health`
#[derive(Debug)]
pub struct MetricsServer {
    listener: TcpListener,
    app: Router,
}

impl MetricsServer {
    /// Bind `addr`; failing here is a startup error
    pub async fn bind(addr: SocketAddr, metrics: Metrics, run_id: Uuid) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Metrics endpoint listening");
        Ok(Self {
            listener,
            app: router(ServerState { metrics, run_id }),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("Metrics endpoint stopped");
        Ok(())
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_check(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "ledger-stress",
        version: env!("CARGO_PKG_VERSION"),
        run_id: state.run_id,
    })
}

async fn metrics_handler(
    State(state): State<ServerState>,
) -> std::result::Result<String, (StatusCode, String)> {
    state.metrics.export().map_err(|e| {
        error!(error = %e, "Failed to export metrics");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to export metrics: {}", e),
        )
    })
}
