//! Job envelope and identifier.
//!
//! A [`Job`] pairs an opaque [`JobId`] with an immutable payload. It is
//! created once at submission time and moved, never cloned, from the queue
//! into the processor.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hashing::to_hex;

/// Number of random bytes behind a job identifier (64 hex characters).
pub const JOB_ID_BYTES: usize = 32;

/// Opaque, process-unique job identifier.
///
/// Rendered as 64 lowercase hex characters drawn from the thread-local
/// CSPRNG, so collisions within a process lifetime are not a practical
/// concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; JOB_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(to_hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of queued work.
#[derive(Debug)]
pub struct Job<T> {
    pub id: JobId,
    pub payload: T,
}

impl<T> Job<T> {
    /// Wrap `payload` with a freshly generated identifier.
    pub fn new(payload: T) -> Self {
        Self {
            id: JobId::generate(),
            payload,
        }
    }
}
