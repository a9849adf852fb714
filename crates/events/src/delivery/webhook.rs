//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDispatcher`] serializes a payload to canonical JSON, signs the
//! exact bytes with HMAC-SHA256 when a secret is configured, and POSTs them
//! to an external URL. Failed attempts (transport errors, timeouts,
//! non-2xx statuses) are retried up to [`RetryPolicy::max_attempts`] times
//! with capped exponential backoff. Nothing is slept after the last attempt.

use std::time::Duration;

use lightning_core::webhook::{backoff_delay, canonical_json, sign_payload, SIGNATURE_HEADER};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

/// Default number of attempts per notification.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default HTTP timeout for a single delivery attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Failed to serialize webhook payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    /// Every attempt failed; carries the last failure.
    #[error("Webhook delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<WebhookError>,
    },
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt budget and backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each later failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookDispatcher
// ---------------------------------------------------------------------------

/// Delivers JSON payloads to caller-supplied webhook endpoints.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    secret: Option<String>,
    policy: RetryPolicy,
}

impl WebhookDispatcher {
    /// Create a dispatcher. An empty `secret` is the same as no secret.
    pub fn new(policy: RetryPolicy, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            secret: secret.filter(|s| !s.is_empty()),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_signing(&self) -> bool {
        self.secret.is_some()
    }

    /// Deliver `payload` to `url` with retry.
    ///
    /// Returns `Ok(())` on the first 2xx response, or
    /// [`WebhookError::Exhausted`] wrapping the last failure once the
    /// attempt budget is spent.
    pub async fn deliver<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<(), WebhookError> {
        let body = canonical_json(payload)?;
        let signature = self.secret.as_deref().map(|s| sign_payload(s, &body));
        let attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_send(url, &body, signature.as_deref()).await {
                Ok(()) => {
                    tracing::debug!(url, attempt, "Webhook delivered");
                    return Ok(());
                }
                Err(e) if attempt >= attempts => {
                    tracing::error!(url, attempts, error = %e, "Webhook delivery failed after all retries");
                    return Err(WebhookError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = backoff_delay(attempt, self.policy.base_delay, self.policy.max_delay);
                    tracing::warn!(
                        attempt,
                        url,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(
        &self,
        url: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), WebhookError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use assert_matches::assert_matches;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;

    use super::*;

    struct Received {
        at: Instant,
        headers: HeaderMap,
        body: Bytes,
    }

    /// Loopback endpoint that fails the first `failures` requests.
    struct Endpoint {
        failures: usize,
        received: Mutex<Vec<Received>>,
    }

    async fn record(
        State(endpoint): State<Arc<Endpoint>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let mut received = endpoint.received.lock().unwrap();
        received.push(Received {
            at: Instant::now(),
            headers,
            body,
        });
        if received.len() <= endpoint.failures {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        }
    }

    async fn spawn_endpoint(failures: usize) -> (String, Arc<Endpoint>) {
        let endpoint = Arc::new(Endpoint {
            failures,
            received: Mutex::new(Vec::new()),
        });
        let router = Router::new()
            .route("/hook", post(record))
            .with_state(endpoint.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/hook"), endpoint)
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(60),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[derive(Serialize)]
    struct Payload {
        status: &'static str,
        job_id: &'static str,
    }

    const PAYLOAD: Payload = Payload {
        status: "succeeded",
        job_id: "abc",
    };

    #[tokio::test]
    async fn signed_delivery_sends_canonical_body_and_signature() {
        let (url, endpoint) = spawn_endpoint(0).await;
        let dispatcher = WebhookDispatcher::new(fast_policy(3), Some("s3cret".into()));

        dispatcher.deliver(&url, &PAYLOAD).await.unwrap();

        let received = endpoint.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let request = &received[0];
        assert_eq!(&request.body[..], br#"{"job_id":"abc","status":"succeeded"}"#);
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(
            request.headers["x-signature"].to_str().unwrap(),
            sign_payload("s3cret", &request.body)
        );
    }

    #[tokio::test]
    async fn no_secret_means_no_signature_header() {
        let (url, endpoint) = spawn_endpoint(0).await;
        for secret in [None, Some(String::new())] {
            let dispatcher = WebhookDispatcher::new(fast_policy(1), secret);
            assert!(!dispatcher.is_signing());
            dispatcher.deliver(&url, &PAYLOAD).await.unwrap();
        }

        let received = endpoint.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|r| !r.headers.contains_key("x-signature")));
    }

    #[tokio::test]
    async fn failing_endpoint_is_tried_exactly_max_attempts_times() {
        let (url, endpoint) = spawn_endpoint(usize::MAX).await;
        let dispatcher = WebhookDispatcher::new(fast_policy(4), None);

        let err = dispatcher.deliver(&url, &PAYLOAD).await.unwrap_err();
        assert_matches!(
            err,
            WebhookError::Exhausted { attempts: 4, ref last } if matches!(**last, WebhookError::HttpStatus(500))
        );

        let received = endpoint.received.lock().unwrap();
        assert_eq!(received.len(), 4);
        let gaps: Vec<Duration> = received.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert!(gaps[0] >= Duration::from_millis(20));
        assert!(gaps.windows(2).all(|w| w[1] + Duration::from_millis(5) >= w[0]));
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let (url, endpoint) = spawn_endpoint(2).await;
        let dispatcher = WebhookDispatcher::new(fast_policy(3), None);

        dispatcher.deliver(&url, &PAYLOAD).await.unwrap();
        assert_eq!(endpoint.received.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let (url, endpoint) = spawn_endpoint(usize::MAX).await;
        let dispatcher = WebhookDispatcher::new(fast_policy(0), None);

        let err = dispatcher.deliver(&url, &PAYLOAD).await.unwrap_err();
        assert_matches!(err, WebhookError::Exhausted { attempts: 1, .. });
        assert_eq!(endpoint.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dispatcher = WebhookDispatcher::new(fast_policy(2), None);

        let err = dispatcher
            .deliver(&format!("http://{addr}/hook"), &PAYLOAD)
            .await
            .unwrap_err();
        assert_matches!(err, WebhookError::Exhausted { attempts: 2, ref last } if matches!(**last, WebhookError::Request(_)));
    }

    #[test]
    fn default_does_not_panic() {
        let dispatcher = WebhookDispatcher::default();
        assert_eq!(dispatcher.policy().max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }

    #[test]
    fn webhook_error_display_exhausted() {
        let err = WebhookError::Exhausted {
            attempts: 3,
            last: Box::new(WebhookError::HttpStatus(503)),
        };
        assert_eq!(
            err.to_string(),
            "Webhook delivery failed after 3 attempts: Webhook returned HTTP 503"
        );
    }
}
