use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Error type for [`SecureFetcher`](crate::SecureFetcher) failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Malformed URL, unsupported scheme or missing hostname.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A resolved address failed the address policy. Never retried.
    #[error("URL resolves to a private or restricted IP ({host} -> {ip})")]
    RestrictedAddress { host: String, ip: IpAddr },

    #[error("Downloaded audio exceeds size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("Downloaded audio is empty")]
    EmptyBody,

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Connection failure or non-2xx response.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Temporary file could not be created or written.
    #[error("Temporary file error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    /// `true` when the URL was refused by the address policy.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::RestrictedAddress { .. })
    }
}
