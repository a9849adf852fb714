//! Job submission.
//!
//! Requests are validated, queued and acknowledged with `202 Accepted`.
//! The outcome arrives later at the request's `webhook_url`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use lightning_core::request::{AcceptedResponse, TranscribeRequest};

use crate::error::AppResult;
use crate::state::AppState;

/// POST /predict, POST /v1/transcribe
async fn submit(
    State(state): State<AppState>,
    body: Result<Json<TranscribeRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AcceptedResponse>)> {
    let Json(request) = body?;
    request.validate()?;

    let job_id = state.queue.submit(request)?;
    tracing::info!(job_id = %job_id, "Transcription job accepted");

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new(job_id))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/predict", post(submit))
        .route("/v1/transcribe", post(submit))
}
