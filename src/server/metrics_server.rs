// src/server/metrics_server.rs

use crate::core::metrics::gather_metrics;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Serves Prometheus metrics on /metrics until `stop` is cancelled.
pub async fn run_metrics_server(listener: TcpListener, stop: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    match listener.local_addr() {
        Ok(addr) => info!("Prometheus metrics server listening on http://{}/metrics", addr),
        Err(e) => error!("Metrics listener has no local address: {}", e),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop.cancelled().await;
            info!("Metrics server shutting down.");
        })
        .await
    {
        error!("Metrics server failed: {}", e);
    }
}
