//! HTTP server implementation using axum.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::StatusConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::StatusState;
use crate::types::{HealthResponse, StatusSnapshot};

/// Read-only routes. No handler mutates engine state.
pub fn create_router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

async fn get_status(State(state): State<StatusState>) -> Json<StatusSnapshot> {
    Json(state.collect_snapshot())
}

async fn get_health(State(state): State<StatusState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        trading_allowed: state.trading_allowed(),
    })
}

async fn get_metrics() -> Response {
    match lagarb_telemetry::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(
    state: StatusState,
    config: StatusConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.socket_addr().map_err(DashboardError::Config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting status server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Status server stopped");
    Ok(())
}
