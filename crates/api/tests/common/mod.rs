#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use lightning_core::request::TranscribeRequest;
use lightning_pipeline::JobQueue;
use serde_json::Value;
use tower::ServiceExt;

use lightning_api::config::ServiceConfig;
use lightning_api::router::build_app_router;
use lightning_api::state::AppState;

/// Build a test `ServiceConfig` with safe defaults.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServiceConfig::default()
    }
}

/// Build the full application router around a queue whose consumer is
/// never started, so submitted jobs stay queued and can be counted.
pub fn build_test_app(queue_capacity: usize) -> (Router, Arc<JobQueue<TranscribeRequest>>) {
    let config = test_config();
    let queue = Arc::new(JobQueue::new(queue_capacity));
    let state = AppState {
        queue: Arc::clone(&queue),
    };
    (build_app_router(state, &config), queue)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    post_raw(app, uri, "application/json", body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, content_type: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
