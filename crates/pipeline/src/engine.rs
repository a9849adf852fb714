//! The inference engine seam.
//!
//! The pipeline never talks to a model runtime directly. It drives an
//! [`InferenceEngine`] whose associated `Model` and `Bundle` types are
//! opaque handles owned by the job consumer.

use async_trait::async_trait;
use lightning_core::transcript::Segment;

use crate::audio::AudioBuffer;

/// Per-call transcription parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribeOptions {
    pub batch_size: u32,
    /// Chunk length in seconds.
    pub chunk_size: u32,
    /// Requested language; `None` lets the engine detect it.
    pub language: Option<String>,
}

/// Raw transcription output, before alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Detected or forced language, when the engine reports one.
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model {model} ({variant}): {reason}")]
    ModelLoad {
        model: String,
        variant: String,
        reason: String,
    },

    #[error("Failed to load alignment model for language {language}: {reason}")]
    AlignmentLoad { language: String, reason: String },

    #[error("Transcription failed: {0}")]
    Transcribe(String),

    #[error("Alignment failed: {0}")]
    Align(String),

    #[error("Inference backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    type Model: Send + Sync + 'static;
    type Bundle: Send + Sync + 'static;

    async fn load_model(&self, name: &str, variant: &str) -> Result<Self::Model, InferenceError>;

    async fn transcribe(
        &self,
        model: &Self::Model,
        audio: &AudioBuffer,
        options: &TranscribeOptions,
    ) -> Result<Transcript, InferenceError>;

    /// Load the alignment bundle for `language`, or the named override.
    async fn load_alignment(
        &self,
        language: &str,
        align_model: Option<&str>,
    ) -> Result<Self::Bundle, InferenceError>;

    /// Attach word-level timings to `segments`.
    async fn align(
        &self,
        segments: Vec<Segment>,
        bundle: &Self::Bundle,
        audio: &AudioBuffer,
    ) -> Result<Vec<Segment>, InferenceError>;

    /// Best-effort release of accelerator caches after a job.
    fn reclaim_memory(&self) {}
}

/// Engine used when no inference backend is linked in. Every model load
/// fails with [`InferenceError::Unavailable`], so jobs end in a failed
/// notification instead of hanging.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredEngine;

const UNCONFIGURED: &str = "no inference backend is configured for this build";

#[async_trait]
impl InferenceEngine for UnconfiguredEngine {
    type Model = ();
    type Bundle = ();

    async fn load_model(&self, _name: &str, _variant: &str) -> Result<(), InferenceError> {
        Err(InferenceError::Unavailable(UNCONFIGURED.into()))
    }

    async fn transcribe(
        &self,
        _model: &(),
        _audio: &AudioBuffer,
        _options: &TranscribeOptions,
    ) -> Result<Transcript, InferenceError> {
        Err(InferenceError::Unavailable(UNCONFIGURED.into()))
    }

    async fn load_alignment(
        &self,
        _language: &str,
        _align_model: Option<&str>,
    ) -> Result<(), InferenceError> {
        Err(InferenceError::Unavailable(UNCONFIGURED.into()))
    }

    async fn align(
        &self,
        _segments: Vec<Segment>,
        _bundle: &(),
        _audio: &AudioBuffer,
    ) -> Result<Vec<Segment>, InferenceError> {
        Err(InferenceError::Unavailable(UNCONFIGURED.into()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn unconfigured_engine_refuses_to_load() {
        let err = UnconfiguredEngine.load_model("large-v3", "float16").await.unwrap_err();
        assert_matches!(err, InferenceError::Unavailable(_));
        assert!(err.to_string().starts_with("Inference backend unavailable"));
    }

    #[test]
    fn model_load_error_names_model_and_variant() {
        let err = InferenceError::ModelLoad {
            model: "tiny".into(),
            variant: "int8".into(),
            reason: "out of memory".into(),
        };
        assert_eq!(err.to_string(), "Failed to load model tiny (int8): out of memory");
    }
}
