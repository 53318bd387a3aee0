use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use imagesize::ImageType;
use thiserror::Error;

use crate::application::relay::{AvatarRelay, RelayError, relay_target};

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("image reference `{0}` does not go through the relay")]
    NotRelayed(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("image body could not be read: {0}")]
    Body(String),
    #[error("image could not be decoded: {0}")]
    Undecodable(String),
    #[error("unsupported image format {0:?}")]
    Unsupported(ImageType),
}

/// A fully fetched and decoded image, ready to be inlined.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub mime: &'static str,
    pub width: usize,
    pub height: usize,
    pub bytes: Bytes,
}

impl LoadedImage {
    /// Sniff and size raw bytes. Fails for anything the rasterizer cannot draw.
    pub fn decode(bytes: Bytes) -> Result<Self, ImageLoadError> {
        let kind = imagesize::image_type(&bytes)
            .map_err(|err| ImageLoadError::Undecodable(err.to_string()))?;
        let mime = match kind {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
            other => return Err(ImageLoadError::Unsupported(other)),
        };
        let size = imagesize::blob_size(&bytes)
            .map_err(|err| ImageLoadError::Undecodable(err.to_string()))?;
        if size.width == 0 || size.height == 0 {
            return Err(ImageLoadError::Undecodable("zero-sized image".to_string()));
        }

        Ok(Self {
            mime,
            width: size.width,
            height: size.height,
            bytes,
        })
    }

    pub fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.mime)
    }
}

/// Resolves an image reference embedded in a card to decoded pixels.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, src: &str) -> Result<LoadedImage, ImageLoadError>;
}

/// Loads `/api/img?url=...` references in-process through the avatar relay.
pub struct RelayImageLoader {
    relay: Arc<AvatarRelay>,
    max_bytes: usize,
}

impl RelayImageLoader {
    pub fn new(relay: Arc<AvatarRelay>, max_bytes: usize) -> Self {
        Self { relay, max_bytes }
    }
}

#[async_trait]
impl ImageLoader for RelayImageLoader {
    async fn load(&self, src: &str) -> Result<LoadedImage, ImageLoadError> {
        let target = relay_target(src).ok_or_else(|| ImageLoadError::NotRelayed(src.to_string()))?;
        let relayed = self.relay.relay(Some(&target)).await?;
        let bytes = axum::body::to_bytes(relayed.body, self.max_bytes)
            .await
            .map_err(|err| ImageLoadError::Body(err.to_string()))?;
        LoadedImage::decode(bytes)
    }
}
