//! Job dispatch pipeline for the lightning transcription service.
//!
//! - [`queue`]: bounded FIFO [`JobQueue`] drained by a single background
//!   consumer.
//! - [`processor`]: [`TranscriptionProcessor`], the per-job workflow
//!   (fetch, decode, transcribe, align, notify).
//! - [`engine`]: the [`InferenceEngine`] seam the processor drives.
//! - [`audio`]: the [`AudioDecoder`] seam and a WAV implementation.
//! - [`align_cache`]: per-language alignment bundle cache.

pub mod align_cache;
pub mod audio;
pub mod engine;
pub mod processor;
pub mod queue;

pub use align_cache::AlignmentCache;
pub use audio::{AudioBuffer, AudioDecoder, DecodeError, WavDecoder};
pub use engine::{InferenceEngine, InferenceError, TranscribeOptions, Transcript, UnconfiguredEngine};
pub use processor::{JobError, JobStage, ProcessorSettings, TranscriptionProcessor};
pub use queue::{JobHandler, JobQueue, QueueError};
