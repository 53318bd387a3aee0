//! Same-origin avatar relay.
//!
//! Externally hosted avatars are re-served from `/api/img` so the card can
//! embed their pixels. Only hosts on a fixed allow-list (or their
//! subdomains) are fetched, which keeps the endpoint from acting as an open
//! proxy.

use std::sync::Arc;

use axum::{body::Body, http::StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::upstream::{ImageFetcher, UpstreamError};

/// Path of the relay endpoint.
pub const RELAY_PATH: &str = "/api/img";

/// Content type used when neither the upstream nor the URL tells us better.
pub const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

/// Cache lifetime advertised on relayed images.
pub const RELAY_CACHE_CONTROL: &str = "public, max-age=3600, s-maxage=3600";

pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "twimg.com",
    "pbs.twimg.com",
    "abs.twimg.com",
    "unavatar.io",
    "avatars.githubusercontent.com",
];

/// Build the relay path for an external image URL.
pub fn relay_path(target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{RELAY_PATH}?url={encoded}")
}

/// Recover the target URL from a relay path, if `path` is one.
pub fn relay_target(path: &str) -> Option<String> {
    let query = path.strip_prefix(RELAY_PATH)?.strip_prefix('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
}

/// Hostnames the relay may fetch from. Matches exact hosts and subdomains.
#[derive(Debug, Clone)]
pub struct AllowList {
    hosts: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| normalize_host(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn permits(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing `url` query parameter")]
    MissingUrl,
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("host `{0}` is not allow-listed")]
    HostNotAllowed(String),
    #[error("upstream responded with status {0}")]
    UpstreamStatus(StatusCode),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// Status code the relay endpoint answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingUrl | RelayError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            RelayError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            RelayError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::MissingUrl | RelayError::InvalidUrl { .. } => "invalid",
            RelayError::HostNotAllowed(_) => "forbidden",
            RelayError::UpstreamStatus(_) => "bad_gateway",
            RelayError::Upstream(_) => "error",
        }
    }
}

/// An upstream image ready to be streamed back to the browser.
pub struct RelayedImage {
    pub content_type: String,
    pub body: Body,
}

pub struct AvatarRelay {
    allow_list: AllowList,
    fetcher: Arc<dyn ImageFetcher>,
}

impl AvatarRelay {
    pub fn new(allow_list: AllowList, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            allow_list,
            fetcher,
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Check the `url` parameter without touching the network.
    pub fn validate(&self, raw: Option<&str>) -> Result<Url, RelayError> {
        let raw = raw
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(RelayError::MissingUrl)?;

        let url = Url::parse(raw).map_err(|err| RelayError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        let host = url.host_str().ok_or_else(|| RelayError::InvalidUrl {
            url: raw.to_string(),
            reason: "url has no host".to_string(),
        })?;

        if !self.allow_list.permits(host) {
            return Err(RelayError::HostNotAllowed(host.to_string()));
        }

        Ok(url)
    }

    /// Validate and fetch an image for relaying.
    pub async fn relay(&self, raw: Option<&str>) -> Result<RelayedImage, RelayError> {
        let url = self.validate(raw)?;

        let upstream = self.fetcher.fetch(&url).await.inspect_err(|err| {
            warn!(
                target = "ritual_cards::relay",
                url = %url,
                error = %err,
                "upstream image fetch failed"
            );
        })?;

        if !upstream.status.is_success() {
            debug!(
                target = "ritual_cards::relay",
                url = %url,
                status = upstream.status.as_u16(),
                "upstream image responded with non-success status"
            );
            return Err(RelayError::UpstreamStatus(upstream.status));
        }

        let content_type = resolve_content_type(upstream.content_type.as_deref(), &url);

        Ok(RelayedImage {
            content_type,
            body: upstream.body,
        })
    }
}

fn resolve_content_type(upstream: Option<&str>, url: &Url) -> String {
    if let Some(value) = upstream.map(str::trim).filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    mime_guess::from_path(url.path())
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::upstream::UpstreamImage;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        status: Option<StatusCode>,
        content_type: Option<&'static str>,
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, _url: &Url) -> Result<UpstreamImage, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UpstreamImage {
                status: self.status.unwrap_or(StatusCode::OK),
                content_type: self.content_type.map(str::to_string),
                body: Body::from("pixels"),
            })
        }
    }

    struct UnreachableFetcher;

    #[async_trait]
    impl ImageFetcher for UnreachableFetcher {
        async fn fetch(&self, _url: &Url) -> Result<UpstreamImage, UpstreamError> {
            Err(UpstreamError::transport("connection reset by peer"))
        }
    }

    fn relay_with(fetcher: Arc<CountingFetcher>) -> AvatarRelay {
        AvatarRelay::new(AllowList::default(), fetcher)
    }

    #[test]
    fn allow_list_matches_exact_and_subdomains() {
        let list = AllowList::default();
        assert!(list.permits("pbs.twimg.com"));
        assert!(list.permits("sub.twimg.com"));
        assert!(list.permits("PBS.TWIMG.COM."));
        assert!(!list.permits("evil.com"));
        assert!(!list.permits("eviltwimg.com"));
        assert!(!list.permits("twimg.com.evil.com"));
        assert!(!list.permits(""));
    }

    #[test]
    fn relay_path_round_trips() {
        let target = "https://pbs.twimg.com/profile_images/1/a b.jpg?x=1&y=2";
        let path = relay_path(target);
        assert!(path.starts_with("/api/img?url=https%3A%2F%2Fpbs.twimg.com"));
        assert_eq!(relay_target(&path).as_deref(), Some(target));
        assert_eq!(relay_target("/elsewhere?url=x"), None);
    }

    #[tokio::test]
    async fn missing_or_invalid_urls_are_bad_requests() {
        let fetcher = Arc::new(CountingFetcher::default());
        let relay = relay_with(fetcher.clone());

        for raw in [None, Some(""), Some("not a url"), Some("ftp://pbs.twimg.com/a.jpg")] {
            let err = relay.relay(raw).await.err().expect("rejected");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{raw:?}");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn foreign_hosts_are_forbidden_without_fetching() {
        let fetcher = Arc::new(CountingFetcher::default());
        let relay = relay_with(fetcher.clone());

        let err = relay
            .relay(Some("https://evil.com/x.jpg"))
            .await
            .err()
            .expect("rejected");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_hosts_are_fetched() {
        let fetcher = Arc::new(CountingFetcher {
            content_type: Some("image/png"),
            ..Default::default()
        });
        let relay = relay_with(fetcher.clone());

        for raw in [
            "https://pbs.twimg.com/profile.jpg",
            "https://sub.twimg.com/x.jpg",
        ] {
            let image = relay.relay(Some(raw)).await.expect("relayed");
            assert_eq!(image.content_type, "image/png");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upstream_failure_status_is_bad_gateway() {
        let fetcher = Arc::new(CountingFetcher {
            status: Some(StatusCode::NOT_FOUND),
            ..Default::default()
        });
        let relay = relay_with(fetcher);

        let err = relay
            .relay(Some("https://pbs.twimg.com/gone.jpg"))
            .await
            .err()
            .expect("rejected");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn transport_failure_is_server_error() {
        let relay = AvatarRelay::new(AllowList::default(), Arc::new(UnreachableFetcher));

        let err = relay
            .relay(Some("https://pbs.twimg.com/avatar.jpg"))
            .await
            .err()
            .expect("rejected");
        assert!(matches!(err, RelayError::Upstream(UpstreamError::Transport(_))));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.outcome(), "error");
    }

    #[test]
    fn content_type_falls_back_to_path_then_jpeg() {
        let png = Url::parse("https://pbs.twimg.com/a.png").unwrap();
        let bare = Url::parse("https://pbs.twimg.com/avatar").unwrap();
        let html = Url::parse("https://pbs.twimg.com/page.html").unwrap();

        assert_eq!(resolve_content_type(Some("image/webp"), &png), "image/webp");
        assert_eq!(resolve_content_type(None, &png), "image/png");
        assert_eq!(resolve_content_type(Some("  "), &bare), FALLBACK_CONTENT_TYPE);
        assert_eq!(resolve_content_type(None, &html), FALLBACK_CONTENT_TYPE);
    }
}
