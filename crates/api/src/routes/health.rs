use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` while accepting jobs, `stopping` once the queue is closed.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

/// GET /health -- returns service and queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.queue.is_stopped() { "stopping" } else { "ok" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        queue_depth: state.queue.len(),
        queue_capacity: state.queue.capacity(),
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
