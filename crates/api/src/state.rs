use std::sync::Arc;

use lightning_core::request::TranscribeRequest;
use lightning_pipeline::JobQueue;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Submission side of the job queue. The consumer is owned elsewhere.
    pub queue: Arc<JobQueue<TranscribeRequest>>,
}
