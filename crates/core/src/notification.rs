//! Terminal job notifications delivered to the caller's webhook.
//!
//! Every job produces exactly one [`ResultNotification`]. The `status` tag
//! is part of the wire format:
//!
//! - `succeeded`: carries `segments`, optional `words` and `timings`, never `error`.
//! - `failed`: carries `error`, never `segments`.

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::transcript::{Segment, Word};

/// Wall-clock timings for a job, in seconds rounded to 4 decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub total_seconds: f64,
    pub fetch_seconds: f64,
    pub transcribe_seconds: f64,
    pub align_seconds: f64,
}

/// Round a duration in seconds to 4 decimal places.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 10_000.0).round() / 10_000.0
}

/// The one and only outcome report for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultNotification {
    Succeeded {
        job_id: JobId,
        model: String,
        language: String,
        segments: Vec<Segment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        words: Option<Vec<Word>>,
        timings: Timings,
    },
    Failed {
        job_id: JobId,
        model: String,
        language: Option<String>,
        error: String,
    },
}

impl ResultNotification {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Succeeded { job_id, .. } | Self::Failed { job_id, .. } => job_id,
        }
    }

    /// Wire value of the `status` tag.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}
