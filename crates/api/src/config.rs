use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use lightning_events::RetryPolicy;
use lightning_fetch::FetchLimits;
use lightning_pipeline::processor::DEFAULT_CHUNK_SIZE;
use lightning_pipeline::queue::DEFAULT_QUEUE_CAPACITY;

/// A malformed environment variable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Service configuration loaded from environment variables.
///
/// Every field has a default suitable for local development.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<HeaderValue>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for the running job (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub max_queue_size: usize,
    /// Chunk size for requests that leave it unset.
    pub chunk_size: u32,
    /// HMAC secret for webhook signatures; `None` sends unsigned webhooks.
    pub webhook_secret: Option<String>,
    pub fetch: FetchLimits,
    pub webhook: RetryPolicy,
    /// Model loaded at startup.
    pub whisper_model: String,
    pub whisper_compute_type: String,
    /// Languages whose default alignment bundles are loaded at startup.
    pub align_langs: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            max_queue_size: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            webhook_secret: None,
            fetch: FetchLimits::default(),
            webhook: RetryPolicy::default(),
            whisper_model: "large-v3".into(),
            whisper_compute_type: "float16".into(),
            align_langs: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                    | Default      |
    /// |----------------------------|--------------|
    /// | `HOST`                     | `0.0.0.0`    |
    /// | `PORT`                     | `8000`       |
    /// | `CORS_ORIGINS`             | empty        |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`         |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`         |
    /// | `MAX_QUEUE_SIZE`           | `1000`       |
    /// | `CHUNK_SIZE`               | `8`          |
    /// | `LIGHTNING_WEBHOOK_SECRET` | unset        |
    /// | `FETCH_TIMEOUT_SECS`       | `120`        |
    /// | `FETCH_MAX_BYTES`          | `524288000`  |
    /// | `WEBHOOK_TIMEOUT_SECS`     | `15`         |
    /// | `WEBHOOK_MAX_ATTEMPTS`     | `3`          |
    /// | `WEBHOOK_BACKOFF_BASE_MS`  | `500`        |
    /// | `WEBHOOK_BACKOFF_MAX_MS`   | `10000`      |
    /// | `WHISPER_MODEL`            | `large-v3`   |
    /// | `WHISPER_COMPUTE_TYPE`     | `float16`    |
    /// | `ALIGN_LANGS`              | empty        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = Self::default();

        let cors_origins = env
            .list("CORS_ORIGINS")
            .into_iter()
            .map(|origin| {
                HeaderValue::from_str(&origin).map_err(|_| ConfigError {
                    name: "CORS_ORIGINS",
                    value: origin,
                    expected: "a list of valid origins",
                })
            })
            .collect::<Result<_, _>>()?;

        let max_queue_size: usize = env.parse("MAX_QUEUE_SIZE", defaults.max_queue_size)?;
        if max_queue_size == 0 {
            return Err(ConfigError {
                name: "MAX_QUEUE_SIZE",
                value: "0".into(),
                expected: "at least 1",
            });
        }

        let chunk_size: u32 = env.parse("CHUNK_SIZE", defaults.chunk_size)?;
        if !(1..=120).contains(&chunk_size) {
            return Err(ConfigError {
                name: "CHUNK_SIZE",
                value: chunk_size.to_string(),
                expected: "between 1 and 120",
            });
        }

        let max_attempts: u32 = env.parse("WEBHOOK_MAX_ATTEMPTS", defaults.webhook.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError {
                name: "WEBHOOK_MAX_ATTEMPTS",
                value: "0".into(),
                expected: "at least 1",
            });
        }

        let fetch = FetchLimits {
            timeout: Duration::from_secs(
                env.parse("FETCH_TIMEOUT_SECS", defaults.fetch.timeout.as_secs())?,
            ),
            max_bytes: env.parse("FETCH_MAX_BYTES", defaults.fetch.max_bytes)?,
        };

        let webhook = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(env.parse(
                "WEBHOOK_BACKOFF_BASE_MS",
                defaults.webhook.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(env.parse(
                "WEBHOOK_BACKOFF_MAX_MS",
                defaults.webhook.max_delay.as_millis() as u64,
            )?),
            request_timeout: Duration::from_secs(env.parse(
                "WEBHOOK_TIMEOUT_SECS",
                defaults.webhook.request_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            host: env.string("HOST").unwrap_or(defaults.host),
            port: env.parse("PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: env.parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            shutdown_timeout_secs: env
                .parse("SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout_secs)?,
            max_queue_size,
            chunk_size,
            webhook_secret: env.string("LIGHTNING_WEBHOOK_SECRET"),
            fetch,
            webhook,
            whisper_model: env.string("WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            whisper_compute_type: env
                .string("WHISPER_COMPUTE_TYPE")
                .unwrap_or(defaults.whisper_compute_type),
            align_langs: env.list("ALIGN_LANGS"),
        })
    }
}

/// Typed access to an environment lookup. Empty values count as unset.
struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.string(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.string(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError {
                name,
                value: raw,
                expected: "a non-negative integer",
            }),
        }
    }
}
