//! netmon-api: the HTTP surface of the probe daemon.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of the latest probe results |
//! | GET | `/healthz` | Liveness |
//!
//! Handlers only read from the [`MetricRegistry`]; they run independently
//! of the probe cycle and never wait for it.

pub mod handlers;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use netmon_metrics::MetricRegistry;
use tracing::info;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: MetricRegistry,
}

/// Build the complete router.
pub fn build_router(registry: MetricRegistry) -> Router {
    let state = ApiState { registry };

    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}

/// Bind `addr` and serve the router until the process exits.
pub async fn serve(addr: SocketAddr, registry: MetricRegistry) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving metrics at /metrics");
    axum::serve(listener, build_router(registry)).await
}
