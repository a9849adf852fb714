//! Transcription request schema, defaults and validation.
//!
//! [`TranscribeRequest`] is the payload carried by every queued job. It is
//! validated once at the HTTP boundary and is immutable afterwards.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::job::JobId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "large-v3-turbo";

/// Compute variant used when the request does not name one.
pub const DEFAULT_COMPUTE_TYPE: &str = "auto";

/// Default inference batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 4;

/// Inclusive bounds for `batch_size`.
pub const BATCH_SIZE_RANGE: (u32, u32) = (1, 64);

/// Inclusive bounds for `chunk_size`.
pub const CHUNK_SIZE_RANGE: (u32, u32) = (1, 120);

/// Language used for alignment when neither the engine nor the request
/// provides one.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Maximum accepted length for free-form identifiers (model names, languages).
const MAX_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// TranscribeRequest
// ---------------------------------------------------------------------------

/// A request to transcribe a remote audio file and deliver the result to a
/// webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Public `http`/`https` URL of the audio file.
    pub audio_url: String,
    /// Public `http`/`https` URL that receives the terminal notification.
    pub webhook_url: String,
    /// Inference model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Spoken language; detected by the engine when absent.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Chunk size in seconds; the service default applies when absent.
    #[serde(default)]
    pub chunk_size: Option<u32>,
    /// Compute variant (e.g. `float16`, `int8`, `auto`).
    #[serde(default = "default_compute_type")]
    pub compute_type: String,
    /// Alignment model override; the engine's per-language default otherwise.
    #[serde(default)]
    pub align_model: Option<String>,
    #[serde(default = "default_true")]
    pub return_word_timestamps: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_compute_type() -> String {
    DEFAULT_COMPUTE_TYPE.to_string()
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

impl TranscribeRequest {
    /// Build a request with every optional field at its default.
    pub fn new(audio_url: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            audio_url: audio_url.into(),
            webhook_url: webhook_url.into(),
            model: default_model(),
            language: None,
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: None,
            compute_type: default_compute_type(),
            align_model: None,
            return_word_timestamps: true,
        }
    }

    /// Validate field shapes and ranges.
    ///
    /// This does not resolve hostnames; the address checks happen in the
    /// fetcher right before any network I/O.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_http_url("audio_url", &self.audio_url)?;
        validate_http_url("webhook_url", &self.webhook_url)?;
        validate_name("model", &self.model)?;
        validate_name("compute_type", &self.compute_type)?;
        if let Some(language) = &self.language {
            validate_name("language", language)?;
        }
        if let Some(align_model) = &self.align_model {
            validate_name("align_model", align_model)?;
        }
        validate_range("batch_size", self.batch_size, BATCH_SIZE_RANGE)?;
        if let Some(chunk_size) = self.chunk_size {
            validate_range("chunk_size", chunk_size, CHUNK_SIZE_RANGE)?;
        }
        Ok(())
    }

    /// Chunk size to use, falling back to the service default.
    pub fn effective_chunk_size(&self, service_default: u32) -> u32 {
        self.chunk_size.unwrap_or(service_default)
    }
}

/// Body returned to the submitter once a job has been queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub job_id: JobId,
    pub status: String,
}

impl AcceptedResponse {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: "accepted".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate that `url` parses as an absolute `http`/`https` URL with a host.
///
/// Uses the same parser as the HTTP client, so anything accepted here can
/// also be requested later.
pub fn validate_http_url(field: &str, url: &str) -> Result<(), CoreError> {
    let parsed = Url::parse(url)
        .map_err(|e| CoreError::Validation(format!("{field} is not a valid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    if !parsed.host_str().is_some_and(|host| !host.is_empty()) {
        return Err(CoreError::Validation(format!(
            "{field} must include a hostname"
        )));
    }
    Ok(())
}

fn validate_name(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "{field} must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_range(field: &str, value: u32, (min, max): (u32, u32)) -> Result<(), CoreError> {
    if !(min..=max).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}
