//! Per-job transcription workflow.
//!
//! [`TranscriptionProcessor`] is the [`JobHandler`] behind the job queue.
//! For each job it:
//!
//! 1. Reloads the model if the requested `(model, compute_type)` differs
//!    from the loaded one.
//! 2. Downloads the audio through the [`SecureFetcher`] and decodes it.
//!    The temporary file is gone as soon as decoding finishes.
//! 3. Transcribes, resolves the language, and aligns with a bundle from
//!    the [`AlignmentCache`].
//! 4. Builds exactly one [`ResultNotification`] and hands it to the
//!    [`WebhookDispatcher`].
//!
//! The loaded model and the alignment cache are plain fields: the queue
//! runs one job at a time and owns the processor, so nothing here is shared.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lightning_core::job::{Job, JobId};
use lightning_core::notification::{round_secs, ResultNotification, Timings};
use lightning_core::request::{TranscribeRequest, FALLBACK_LANGUAGE};
use lightning_core::transcript::{flatten_words, Segment, Word};
use lightning_events::WebhookDispatcher;
use lightning_fetch::{DownloadedFile, FetchError, SecureFetcher};

use crate::align_cache::AlignmentCache;
use crate::audio::{AudioBuffer, AudioDecoder, DecodeError};
use crate::engine::{InferenceEngine, InferenceError, TranscribeOptions};
use crate::queue::JobHandler;

/// Chunk size used when neither the request nor the config sets one.
pub const DEFAULT_CHUNK_SIZE: u32 = 8;

// ---------------------------------------------------------------------------
// Stage / error
// ---------------------------------------------------------------------------

/// Where a job is in its lifecycle. Only visible in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Accepted,
    Fetching,
    Transcribing,
    Aligning,
    Delivering,
    Done,
    Failed,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "accepted",
            Self::Fetching => "fetching",
            Self::Transcribing => "transcribing",
            Self::Aligning => "aligning",
            Self::Delivering => "delivering",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// A failure that ends a job. Its message becomes the `error` field of
/// the failed notification.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Chunk size applied when a request leaves `chunk_size` unset.
    pub default_chunk_size: u32,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

struct LoadedModel<M> {
    name: String,
    variant: String,
    model: M,
}

struct JobOutput {
    language: String,
    segments: Vec<Segment>,
    words: Option<Vec<Word>>,
}

/// Per-job progress: current stage and phase timings.
struct Progress<'a> {
    job_id: &'a JobId,
    stage: JobStage,
    timings: Timings,
}

impl Progress<'_> {
    fn enter(&mut self, stage: JobStage) {
        tracing::debug!(job_id = %self.job_id, from = %self.stage, to = %stage, "Job stage");
        self.stage = stage;
    }
}

/// Calls [`InferenceEngine::reclaim_memory`] when dropped.
struct ReclaimGuard<E: InferenceEngine>(Arc<E>);

impl<E: InferenceEngine> Drop for ReclaimGuard<E> {
    fn drop(&mut self) {
        self.0.reclaim_memory();
    }
}

pub struct TranscriptionProcessor<E: InferenceEngine> {
    engine: Arc<E>,
    decoder: Arc<dyn AudioDecoder>,
    fetcher: SecureFetcher,
    dispatcher: WebhookDispatcher,
    settings: ProcessorSettings,
    loaded: Option<LoadedModel<E::Model>>,
    align_cache: AlignmentCache<E::Bundle>,
}

impl<E: InferenceEngine> TranscriptionProcessor<E> {
    pub fn new(
        engine: Arc<E>,
        decoder: Arc<dyn AudioDecoder>,
        fetcher: SecureFetcher,
        dispatcher: WebhookDispatcher,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            engine,
            decoder,
            fetcher,
            dispatcher,
            settings,
            loaded: None,
            align_cache: AlignmentCache::new(),
        }
    }

    /// `(model, compute_type)` of the currently loaded model.
    pub fn loaded_model(&self) -> Option<(&str, &str)> {
        self.loaded
            .as_ref()
            .map(|m| (m.name.as_str(), m.variant.as_str()))
    }

    pub fn cached_alignments(&self) -> usize {
        self.align_cache.len()
    }

    /// Load the startup model and the default alignment bundles for
    /// `languages`. Failures are logged; the first job retries them.
    pub async fn warm_up(&mut self, model: &str, compute_type: &str, languages: &[String]) {
        match self.ensure_model(model, compute_type).await {
            Ok(()) => tracing::info!(model, compute_type, "Model preloaded"),
            Err(e) => tracing::warn!(model, compute_type, error = %e, "Model preload failed"),
        }

        for language in languages {
            if let Err(e) = self.alignment_bundle(language, None).await {
                tracing::warn!(language = %language, error = %e, "Alignment warm-up failed");
            }
        }
    }

    /// Run one job to its terminal notification without delivering it.
    pub async fn process(&mut self, job: &Job<TranscribeRequest>) -> ResultNotification {
        let started = Instant::now();
        let req = &job.payload;
        let mut progress = Progress {
            job_id: &job.id,
            stage: JobStage::Accepted,
            timings: Timings::default(),
        };

        let result = self.run(req, &mut progress).await;
        let mut timings = progress.timings;
        timings.total_seconds = round_secs(started.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                tracing::info!(
                    job_id = %job.id,
                    language = %output.language,
                    segments = output.segments.len(),
                    total_seconds = timings.total_seconds,
                    "Job succeeded"
                );
                ResultNotification::Succeeded {
                    job_id: job.id.clone(),
                    model: req.model.clone(),
                    language: output.language,
                    segments: output.segments,
                    words: output.words,
                    timings,
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    stage = %progress.stage,
                    error = %e,
                    "Job failed"
                );
                ResultNotification::Failed {
                    job_id: job.id.clone(),
                    model: req.model.clone(),
                    language: req.language.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn run(
        &mut self,
        req: &TranscribeRequest,
        progress: &mut Progress<'_>,
    ) -> Result<JobOutput, JobError> {
        self.ensure_model(&req.model, &req.compute_type).await?;

        progress.enter(JobStage::Fetching);
        let phase = Instant::now();
        let file = self.fetcher.fetch(&req.audio_url).await?;
        let audio = self.decode(file).await?;
        progress.timings.fetch_seconds = round_secs(phase.elapsed().as_secs_f64());

        progress.enter(JobStage::Transcribing);
        let phase = Instant::now();
        let options = TranscribeOptions {
            batch_size: req.batch_size,
            chunk_size: req.effective_chunk_size(self.settings.default_chunk_size),
            language: req.language.clone(),
        };
        let model = &self
            .loaded
            .as_ref()
            .ok_or_else(|| JobError::Internal("model is not loaded".into()))?
            .model;
        let transcript = self.engine.transcribe(model, &audio, &options).await?;
        progress.timings.transcribe_seconds = round_secs(phase.elapsed().as_secs_f64());

        let language = resolve_language(transcript.language.as_deref(), req.language.as_deref());

        progress.enter(JobStage::Aligning);
        let phase = Instant::now();
        let bundle = self
            .alignment_bundle(&language, req.align_model.as_deref())
            .await?;
        let segments = self.engine.align(transcript.segments, &bundle, &audio).await?;
        drop(audio);
        progress.timings.align_seconds = round_secs(phase.elapsed().as_secs_f64());

        let words = req.return_word_timestamps.then(|| flatten_words(&segments));
        Ok(JobOutput {
            language,
            segments,
            words,
        })
    }

    async fn ensure_model(&mut self, name: &str, variant: &str) -> Result<(), InferenceError> {
        if self
            .loaded
            .as_ref()
            .is_some_and(|m| m.name == name && m.variant == variant)
        {
            return Ok(());
        }

        tracing::info!(model = name, compute_type = variant, "Loading model");
        // Release the previous model before loading the next one.
        self.loaded = None;
        let model = self.engine.load_model(name, variant).await?;
        self.loaded = Some(LoadedModel {
            name: name.to_string(),
            variant: variant.to_string(),
            model,
        });
        Ok(())
    }

    async fn alignment_bundle(
        &mut self,
        language: &str,
        align_model: Option<&str>,
    ) -> Result<Arc<E::Bundle>, InferenceError> {
        let engine = Arc::clone(&self.engine);
        self.align_cache
            .get_or_load(language, align_model, || {
                engine.load_alignment(language, align_model)
            })
            .await
    }

    /// Decode on the blocking pool; the downloaded file is deleted when
    /// the closure returns.
    async fn decode(&self, file: DownloadedFile) -> Result<AudioBuffer, JobError> {
        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || {
            let audio = decoder.decode(file.path());
            drop(file);
            audio
        })
        .await
        .map_err(|e| JobError::Internal(format!("Audio decode task failed: {e}")))?;
        Ok(decoded?)
    }
}

#[async_trait]
impl<E: InferenceEngine> JobHandler<TranscribeRequest> for TranscriptionProcessor<E> {
    async fn handle(&mut self, job: Job<TranscribeRequest>) {
        let _reclaim = ReclaimGuard(Arc::clone(&self.engine));
        let notification = self.process(&job).await;

        tracing::debug!(job_id = %job.id, stage = %JobStage::Delivering, "Job stage");
        match self
            .dispatcher
            .deliver(&job.payload.webhook_url, &notification)
            .await
        {
            Ok(()) => {
                let stage = if notification.is_success() {
                    JobStage::Done
                } else {
                    JobStage::Failed
                };
                tracing::info!(job_id = %job.id, stage = %stage, "Notification delivered");
            }
            Err(e) => tracing::error!(
                job_id = %job.id,
                status = notification.status(),
                error = %e,
                "Notification could not be delivered"
            ),
        }
    }
}

/// Engine-reported language, then the requested one, then the fallback.
fn resolve_language(detected: Option<&str>, requested: Option<&str>) -> String {
    detected
        .filter(|l| !l.is_empty())
        .or(requested.filter(|l| !l.is_empty()))
        .unwrap_or(FALLBACK_LANGUAGE)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
