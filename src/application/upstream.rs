//! Ports for the external services the card pipeline talks to.

use async_trait::async_trait;
use axum::{body::Body, http::StatusCode};
use thiserror::Error;
use url::Url;

use crate::domain::handle::Handle;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream responded with status {0}")]
    Status(StatusCode),
    #[error("upstream response was malformed: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn malformed(err: impl std::fmt::Display) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// External profile-lookup service. The payload is opaque JSON.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn lookup(&self, handle: &Handle) -> Result<serde_json::Value, UpstreamError>;
}

/// Raw upstream image response. Non-success statuses are returned, not raised.
pub struct UpstreamImage {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Body,
}

impl std::fmt::Debug for UpstreamImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamImage")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Server-side image fetcher used by the avatar relay.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<UpstreamImage, UpstreamError>;
}
