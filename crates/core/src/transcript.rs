//! Timestamped transcript types shared by the engine seam and notifications.

use serde::{Deserialize, Serialize};

/// A single word with optional timing.
///
/// Alignment can leave `start`/`end` empty for tokens it cannot place
/// (numerals, symbols), so every timing field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    /// Alignment confidence in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A transcript segment in seconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Word timings, present once the segment has been aligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: None,
        }
    }
}

/// Flatten the per-segment words into one sequence, preserving order.
pub fn flatten_words(segments: &[Segment]) -> Vec<Word> {
    segments
        .iter()
        .flat_map(|seg| seg.words.iter().flatten())
        .cloned()
        .collect()
}
