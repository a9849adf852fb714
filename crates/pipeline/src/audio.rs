//! Decoded audio and the decoder seam.

use std::path::Path;

use hound::{SampleFormat, WavReader};

/// Mono PCM samples in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to decode WAV audio: {0}")]
    Wav(#[from] hound::Error),

    #[error("Decoded audio contains no samples")]
    Empty,
}

/// Turns a file on disk into an [`AudioBuffer`].
///
/// Decoding is blocking; the processor calls it from `spawn_blocking`.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioBuffer, DecodeError>;
}

/// Decoder for integer and float PCM WAV files, downmixed to mono.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer, DecodeError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << spec.bits_per_sample.saturating_sub(1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(AudioBuffer {
            samples,
            sample_rate: spec.sample_rate,
        })
    }
}
