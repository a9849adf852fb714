pub mod health;
pub mod transcribe;

use axum::Router;

use crate::state::AppState;

/// Build the job submission route tree.
///
/// ```text
/// POST /predict          submit a transcription job
/// POST /v1/transcribe    same, versioned path
/// ```
pub fn api_routes() -> Router<AppState> {
    transcribe::router()
}
