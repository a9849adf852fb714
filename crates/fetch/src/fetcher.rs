//! [`SecureFetcher`] and the scoped [`DownloadedFile`] it returns.
//!
//! A fetch runs these steps for every hop, the first request and each
//! redirect alike:
//!
//! 1. Parse the URL and require `http`/`https` with a hostname.
//! 2. Resolve the host and reject the hop if *any* address fails the
//!    [`AddressPolicy`].
//! 3. Connect with a one-shot client whose DNS is pinned to the addresses
//!    just checked, with automatic redirects disabled.
//!
//! The final response is streamed into a temporary file under a byte cap.
//! Every failure path drops the [`TempPath`], which deletes the file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{redirect, Url};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::policy::AddressPolicy;
use crate::resolve::{Resolve, SystemResolver};

/// Default total time allowed for one fetch, redirects included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default download cap (500 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Maximum number of redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Bounds applied to a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// A downloaded body on local disk, deleted when dropped.
#[derive(Debug)]
pub struct DownloadedFile {
    path: TempPath,
    bytes: u64,
}

impl DownloadedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    /// Always `false`; empty bodies are rejected with
    /// [`FetchError::EmptyBody`].
    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

/// Downloads caller-supplied URLs while refusing restricted destinations.
#[derive(Clone)]
pub struct SecureFetcher {
    resolver: Arc<dyn Resolve>,
    policy: AddressPolicy,
    limits: FetchLimits,
    temp_dir: Option<PathBuf>,
}

impl SecureFetcher {
    /// Fetcher using system DNS and [`AddressPolicy::PublicOnly`].
    pub fn new(limits: FetchLimits) -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
            policy: AddressPolicy::PublicOnly,
            limits,
            temp_dir: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_policy(mut self, policy: AddressPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Place temporary files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Fetch `url` with the configured limits.
    pub async fn fetch(&self, url: &str) -> Result<DownloadedFile, FetchError> {
        self.fetch_with_limits(url, self.limits).await
    }

    /// Fetch `url` with explicit limits.
    ///
    /// The timeout covers resolution, every redirect hop and the body.
    pub async fn fetch_with_limits(
        &self,
        url: &str,
        limits: FetchLimits,
    ) -> Result<DownloadedFile, FetchError> {
        match tokio::time::timeout(limits.timeout, self.fetch_inner(url, limits)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(limits.timeout)),
        }
    }

    async fn fetch_inner(&self, url: &str, limits: FetchLimits) -> Result<DownloadedFile, FetchError> {
        let mut current = parse_url(url)?;

        for hop in 0..=MAX_REDIRECTS {
            let target = self.check_destination(&current).await?;
            let client = build_client(&target, limits.timeout)?;

            tracing::debug!(url = %current, hop, "Fetching");
            let response = client.get(current.clone()).send().await?;

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FetchError::InvalidUrl("Redirect without a usable Location header".into())
                    })?;
                let next = current
                    .join(location)
                    .map_err(|e| FetchError::InvalidUrl(format!("Bad redirect target: {e}")))?;
                current = parse_url(next.as_str())?;
                continue;
            }

            let response = response.error_for_status()?;
            return self.stream_to_temp(response, limits.max_bytes).await;
        }

        Err(FetchError::TooManyRedirects(MAX_REDIRECTS))
    }

    /// Resolve the URL's host and check every address against the policy.
    async fn check_destination(&self, url: &Url) -> Result<Destination, FetchError> {
        let host = host_of(url)?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidUrl("URL has no usable port".into()))?;

        let (addrs, pinned) = match host.parse::<IpAddr>() {
            Ok(ip) => (vec![SocketAddr::new(ip, port)], false),
            Err(_) => {
                let addrs = self
                    .resolver
                    .resolve(&host, port)
                    .await
                    .map_err(|source| FetchError::Resolve {
                        host: host.clone(),
                        source,
                    })?;
                (addrs, true)
            }
        };

        if addrs.is_empty() {
            return Err(FetchError::Resolve {
                host,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            });
        }

        if let Some(bad) = addrs.iter().find(|a| !self.policy.permits(a.ip())) {
            tracing::warn!(host = %host, ip = %bad.ip(), "Refusing restricted destination");
            return Err(FetchError::RestrictedAddress { host, ip: bad.ip() });
        }

        Ok(Destination {
            host,
            addrs,
            pinned,
        })
    }

    async fn stream_to_temp(
        &self,
        mut response: reqwest::Response,
        max_bytes: u64,
    ) -> Result<DownloadedFile, FetchError> {
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::SizeLimitExceeded { limit: max_bytes });
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("lightning-").suffix(".audio");
        let temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut total: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            total += chunk.len() as u64;
            if total > max_bytes {
                return Err(FetchError::SizeLimitExceeded { limit: max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if total == 0 {
            return Err(FetchError::EmptyBody);
        }

        tracing::debug!(bytes = total, path = %path.display(), "Download complete");
        Ok(DownloadedFile { path, bytes: total })
    }
}

/// A checked hop target.
struct Destination {
    host: String,
    addrs: Vec<SocketAddr>,
    /// `false` for IP-literal hosts, which need no DNS override.
    pinned: bool,
}

fn build_client(target: &Destination, timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .no_proxy()
        .connect_timeout(timeout);
    if target.pinned {
        builder = builder.resolve_to_addrs(&target.host, &target.addrs);
    }
    Ok(builder.build()?)
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl("Unsupported URL scheme".into()));
    }
    host_of(&url)?;
    Ok(url)
}

/// Hostname without IPv6 brackets.
fn host_of(url: &Url) -> Result<String, FetchError> {
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(h.trim_start_matches('[').trim_end_matches(']').to_string()),
        _ => Err(FetchError::InvalidUrl("URL missing hostname".into())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::response::Redirect;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::resolve::StaticResolver;

    const LOOPBACK: &str = "127.0.0.1";

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn audio_router() -> Router {
        Router::new()
            .route("/audio", get(|| async { vec![7u8; 1024] }))
            .route("/empty", get(|| async { "" }))
            .route("/redirect", get(|| async { Redirect::temporary("/audio") }))
            .route("/loop", get(|| async { Redirect::temporary("/loop") }))
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
            )
            .route(
                "/stream",
                get(|| async {
                    let chunks = (0..8).map(|_| Ok::<_, std::io::Error>(vec![1u8; 512]));
                    Body::from_stream(futures::stream::iter(chunks))
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
    }

    fn loopback_fetcher(dir: &Path) -> SecureFetcher {
        SecureFetcher::new(FetchLimits::default())
            .with_policy(AddressPolicy::PublicOr(vec![LOOPBACK.parse().unwrap()]))
            .with_temp_dir(dir)
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn downloads_body_and_deletes_on_drop() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = loopback_fetcher(dir.path());

        let file = fetcher.fetch(&format!("http://{addr}/audio")).await.unwrap();
        assert_eq!(file.len(), 1024);
        assert_eq!(std::fs::read(file.path()).unwrap(), vec![7u8; 1024]);
        let path = file.path().to_path_buf();

        drop(file);
        assert!(!path.exists());
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn loopback_literal_is_rejected_before_connecting() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/audio",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "data" }
            }),
        );
        let addr = serve(router).await;
        let fetcher = SecureFetcher::new(FetchLimits::default());

        let err = fetcher.fetch(&format!("http://{addr}/audio")).await.unwrap_err();
        assert_matches!(err, FetchError::RestrictedAddress { ip, .. } if ip.is_loopback());
        assert!(err.to_string().contains("private or restricted IP"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn any_restricted_resolved_address_rejects_the_host() {
        let resolver = StaticResolver::new().with_host(
            "cdn.example.test",
            vec!["93.184.216.34".parse().unwrap(), "10.0.0.1".parse().unwrap()],
        );
        let fetcher = SecureFetcher::new(FetchLimits::default()).with_resolver(Arc::new(resolver));

        let err = fetcher.fetch("https://cdn.example.test/a.wav").await.unwrap_err();
        assert_matches!(err, FetchError::RestrictedAddress { ip, .. } if ip == "10.0.0.1".parse::<IpAddr>().unwrap());
        assert!(err.is_security());
    }

    #[tokio::test]
    async fn connects_to_the_pinned_resolved_address() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticResolver::new().with_host("mirror.test", vec![addr.ip()]);
        let fetcher = loopback_fetcher(dir.path()).with_resolver(Arc::new(resolver));

        let file = fetcher
            .fetch(&format!("http://mirror.test:{}/audio", addr.port()))
            .await
            .unwrap();
        assert_eq!(file.len(), 1024);
    }

    #[tokio::test]
    async fn rejects_bad_scheme_and_missing_host() {
        let fetcher = SecureFetcher::new(FetchLimits::default());

        assert_matches!(
            fetcher.fetch("ftp://example.com/a.wav").await,
            Err(FetchError::InvalidUrl(msg)) if msg == "Unsupported URL scheme"
        );
        assert_matches!(fetcher.fetch("not a url").await, Err(FetchError::InvalidUrl(_)));
        assert_matches!(fetcher.fetch("file:///etc/passwd").await, Err(FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn follows_redirects_to_allowed_hosts() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();

        let file = loopback_fetcher(dir.path())
            .fetch(&format!("http://{addr}/redirect"))
            .await
            .unwrap();
        assert_eq!(file.len(), 1024);
    }

    #[tokio::test]
    async fn redirect_to_restricted_host_is_rejected() {
        let target = serve(audio_router()).await;
        let location = format!("http://127.0.0.2:{}/audio", target.port());
        let router = Router::new().route(
            "/hop",
            get(move || {
                let location = location.clone();
                async move { Redirect::temporary(&location) }
            }),
        );
        let addr = serve(router).await;
        let dir = tempfile::tempdir().unwrap();

        let err = loopback_fetcher(dir.path())
            .fetch(&format!("http://{addr}/hop"))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::RestrictedAddress { ip, .. } if ip == "127.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn redirect_hostname_is_resolved_and_checked_on_its_hop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let target = serve(Router::new().route(
            "/audio",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "data" }
            }),
        ))
        .await;

        let location = format!("http://internal.test:{}/audio", target.port());
        let origin = serve(Router::new().route(
            "/hop",
            get(move || {
                let location = location.clone();
                async move { Redirect::temporary(&location) }
            }),
        ))
        .await;

        // One reachable allowed address plus one private one.
        let resolver = StaticResolver::new().with_host(
            "internal.test",
            vec![LOOPBACK.parse().unwrap(), "10.0.0.5".parse().unwrap()],
        );
        let dir = tempfile::tempdir().unwrap();

        let err = loopback_fetcher(dir.path())
            .with_resolver(Arc::new(resolver))
            .fetch(&format!("http://{origin}/hop"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            FetchError::RestrictedAddress { ref host, ip }
                if host == "internal.test" && ip == "10.0.0.5".parse::<IpAddr>().unwrap()
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn redirect_loop_is_bounded() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();

        let err = loopback_fetcher(dir.path())
            .fetch(&format!("http://{addr}/loop"))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::TooManyRedirects(MAX_REDIRECTS));
    }

    #[tokio::test]
    async fn empty_body_is_an_error_and_leaves_no_file() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();

        let err = loopback_fetcher(dir.path())
            .fetch(&format!("http://{addr}/empty"))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::EmptyBody);
        assert_eq!(err.to_string(), "Downloaded audio is empty");
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn announced_oversize_body_is_rejected_before_reading() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let limits = FetchLimits {
            max_bytes: 100,
            ..FetchLimits::default()
        };

        let err = loopback_fetcher(dir.path())
            .fetch_with_limits(&format!("http://{addr}/audio"), limits)
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::SizeLimitExceeded { limit: 100 });
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn streamed_oversize_body_aborts_and_deletes_partial_file() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let limits = FetchLimits {
            max_bytes: 1500,
            ..FetchLimits::default()
        };

        let err = loopback_fetcher(dir.path())
            .fetch_with_limits(&format!("http://{addr}/stream"), limits)
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::SizeLimitExceeded { limit: 1500 });
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn body_exactly_at_the_cap_is_accepted() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let limits = FetchLimits {
            max_bytes: 4096,
            ..FetchLimits::default()
        };

        let file = loopback_fetcher(dir.path())
            .fetch_with_limits(&format!("http://{addr}/stream"), limits)
            .await
            .unwrap();
        assert_eq!(file.len(), 4096);
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();

        let err = loopback_fetcher(dir.path())
            .fetch(&format!("http://{addr}/missing"))
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::Transport(ref e) if e.status() == Some(reqwest::StatusCode::NOT_FOUND));
        assert!(err.to_string().starts_with("HTTP error:"));
    }

    #[tokio::test]
    async fn slow_server_hits_the_timeout() {
        let addr = serve(audio_router()).await;
        let dir = tempfile::tempdir().unwrap();
        let limits = FetchLimits {
            timeout: Duration::from_millis(200),
            ..FetchLimits::default()
        };

        let err = loopback_fetcher(dir.path())
            .fetch_with_limits(&format!("http://{addr}/slow"), limits)
            .await
            .unwrap_err();
        assert_matches!(err, FetchError::Timeout(_));
        assert_eq!(temp_files(dir.path()), 0);
    }
}
