//! reqwest-backed adapters for the profile API and avatar hosts.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
};
use reqwest::redirect::{Attempt, Policy};
use tracing::{debug, warn};
use url::Url;

use crate::{
    application::{
        relay::AllowList,
        upstream::{ImageFetcher, ProfileSource, UpstreamError, UpstreamImage},
    },
    domain::handle::Handle,
};

use super::error::InfraError;

const MAX_IMAGE_REDIRECTS: usize = 5;

/// Client for the profile API. Requests carry no timeout; callers await them.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, InfraError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|err| InfraError::upstream(format!("failed to build http client: {err}")))
}

/// Client for avatar hosts. Every redirect hop must land on an allow-listed host;
/// otherwise the 3xx itself becomes the final response.
pub fn build_image_client(
    user_agent: &str,
    allow_list: AllowList,
) -> Result<reqwest::Client, InfraError> {
    let policy = Policy::custom(move |attempt| follow_allowed(&allow_list, attempt));

    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(policy)
        .build()
        .map_err(|err| InfraError::upstream(format!("failed to build image client: {err}")))
}

fn follow_allowed(allow_list: &AllowList, attempt: Attempt) -> reqwest::redirect::Action {
    if attempt.previous().len() > MAX_IMAGE_REDIRECTS {
        return attempt.error("too many redirects");
    }

    let target = attempt.url();
    let permitted = matches!(target.scheme(), "http" | "https")
        && target.host_str().is_some_and(|host| allow_list.permits(host));
    if permitted {
        return attempt.follow();
    }

    warn!(
        target = "ritual_cards::upstream",
        host = target.host_str().unwrap_or_default(),
        "image redirect to host outside the allow-list refused"
    );
    attempt.stop()
}

/// Looks profiles up at `<base>/<handle>`.
pub struct HttpProfileSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProfileSource {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn profile_url(&self, handle: &Handle) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::transport("profile api url cannot carry a path"))?
            .pop_if_empty()
            .push(handle.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    async fn lookup(&self, handle: &Handle) -> Result<serde_json::Value, UpstreamError> {
        let url = self.profile_url(handle)?;
        debug!(target = "ritual_cards::upstream", url = %url, "profile lookup");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(UpstreamError::malformed)
    }
}

/// Fetches avatar bytes with a fixed user agent and caching disabled.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &Url) -> Result<UpstreamImage, UpstreamError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(UpstreamError::transport)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(UpstreamImage {
            status,
            content_type,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}
