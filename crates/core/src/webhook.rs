//! Webhook wire helpers: canonical JSON encoding, HMAC signing and
//! retry backoff math.
//!
//! These are pure functions; the HTTP delivery loop lives in
//! `lightning-events`.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::hashing::hmac_sha256_hex;

/// Header carrying the hex HMAC-SHA256 of the exact request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Serialize `payload` deterministically.
///
/// Object keys are written in sorted order at every depth. The output is
/// compact and leaves non-ASCII characters unescaped.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = sort_keys(serde_json::to_value(payload)?);
    serde_json::to_vec(&value)
}

/// Rebuild every object with its keys inserted in sorted order.
///
/// `serde_json::Map` keeps insertion order when the `preserve_order`
/// feature is enabled anywhere in the build, so the order is fixed here.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Compute the lowercase hex signature for a serialized body.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    hmac_sha256_hex(secret.as_bytes(), body)
}

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `min(max, base * 2^(attempt - 1))`, saturating instead of overflowing.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
}
