//! Outbound notification delivery for the lightning service.
//!
//! - [`delivery::webhook`]: signed JSON POSTs with bounded
//!   exponential-backoff retry.

pub mod delivery;

pub use delivery::webhook::{RetryPolicy, WebhookDispatcher, WebhookError};
