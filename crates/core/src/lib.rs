//! Domain types and pure helpers for the lightning transcription service.
//!
//! This crate has no I/O and no internal dependencies so it can be shared
//! by the fetcher, the webhook delivery crate, the job pipeline and the
//! HTTP front end.

pub mod error;
pub mod hashing;
pub mod job;
pub mod net;
pub mod notification;
pub mod request;
pub mod transcript;
pub mod webhook;
