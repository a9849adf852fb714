//! Secure remote-resource fetcher.
//!
//! - [`SecureFetcher`]: downloads a caller-supplied URL into a temporary
//!   file after checking every resolved address against an
//!   [`AddressPolicy`], following redirects by hand and enforcing a byte
//!   cap.
//! - [`DownloadedFile`]: the scoped result; the file is deleted when the
//!   handle is dropped.
//! - [`Resolve`]: the DNS seam, so tests and deployments can pin hosts.

pub mod error;
pub mod fetcher;
pub mod policy;
pub mod resolve;

pub use error::FetchError;
pub use fetcher::{DownloadedFile, FetchLimits, SecureFetcher};
pub use policy::AddressPolicy;
pub use resolve::{Resolve, StaticResolver, SystemResolver};
