//! Delivery strategies: how a generated PNG reaches the user's device.
//!
//! Strategies are mutually exclusive and chosen once per export from the
//! request's platform capabilities. When the chosen strategy fails, the bytes
//! are offered once more as a plain attachment download.

use askama::Template;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use crate::{
    domain::platform::{PlatformCapabilities, PlatformFamily},
    presentation::views::{OverlayTemplate, OverlayView},
};

use super::export::GeneratedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    DirectDownload,
    InPageOverlay,
}

impl DeliveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryKind::DirectDownload => "direct_download",
            DeliveryKind::InPageOverlay => "in_page_overlay",
        }
    }
}

/// Where the overlay's "back" affordance leads.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub return_href: String,
}

/// A failed delivery hands the image back so another strategy can use it.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub image: GeneratedImage,
    pub reason: String,
}

pub trait DeliveryStrategy: Send + Sync {
    fn kind(&self) -> DeliveryKind;

    fn deliver(
        &self,
        image: GeneratedImage,
        context: &DeliveryContext,
    ) -> Result<Response, DeliveryFailure>;
}

/// `Content-Disposition: attachment` download.
pub struct DirectDownload;

impl DeliveryStrategy for DirectDownload {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::DirectDownload
    }

    fn deliver(
        &self,
        image: GeneratedImage,
        _context: &DeliveryContext,
    ) -> Result<Response, DeliveryFailure> {
        let disposition =
            match HeaderValue::from_str(&format!("attachment; filename=\"{}\"", image.name())) {
                Ok(value) => value,
                Err(err) => {
                    return Err(DeliveryFailure {
                        image,
                        reason: format!("invalid attachment header: {err}"),
                    });
                }
            };

        let (_, bytes) = image.into_parts();
        let headers = [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ];
        Ok((StatusCode::OK, headers, bytes).into_response())
    }
}

/// Full-screen page showing the image as a data URL, for browsers that
/// ignore attachment downloads. The user saves it with a long press.
pub struct InPageOverlay;

impl DeliveryStrategy for InPageOverlay {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::InPageOverlay
    }

    fn deliver(
        &self,
        image: GeneratedImage,
        context: &DeliveryContext,
    ) -> Result<Response, DeliveryFailure> {
        let view = OverlayView::new(&image, &context.return_href);
        match (OverlayTemplate { view }).render() {
            Ok(html) => Ok((
                StatusCode::OK,
                [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
                Html(html),
            )
                .into_response()),
            Err(err) => Err(DeliveryFailure {
                image,
                reason: format!("overlay template failed: {err}"),
            }),
        }
    }
}

static DIRECT_DOWNLOAD: DirectDownload = DirectDownload;
static IN_PAGE_OVERLAY: InPageOverlay = InPageOverlay;

pub fn select_strategy(capabilities: &PlatformCapabilities) -> &'static dyn DeliveryStrategy {
    match capabilities.family {
        PlatformFamily::WebKitMobile => &IN_PAGE_OVERLAY,
        PlatformFamily::OtherMobile | PlatformFamily::Desktop => &DIRECT_DOWNLOAD,
    }
}

#[derive(Debug, Error)]
#[error("delivery via {kind:?} failed: {reason}")]
pub struct DeliveryError {
    pub kind: DeliveryKind,
    pub reason: String,
}

/// A completed delivery.
pub struct Delivered {
    pub response: Response,
    pub kind: DeliveryKind,
    pub fell_back: bool,
}

/// Run `primary`, falling back to a direct download with the same bytes.
pub fn deliver_with_fallback(
    primary: &dyn DeliveryStrategy,
    image: GeneratedImage,
    context: &DeliveryContext,
) -> Result<Delivered, DeliveryError> {
    let failure = match primary.deliver(image, context) {
        Ok(response) => {
            return Ok(Delivered {
                response,
                kind: primary.kind(),
                fell_back: false,
            });
        }
        Err(failure) => failure,
    };

    if primary.kind() == DeliveryKind::DirectDownload {
        return Err(DeliveryError {
            kind: primary.kind(),
            reason: failure.reason,
        });
    }

    warn!(
        target = "ritual_cards::delivery",
        strategy = primary.kind().as_str(),
        reason = %failure.reason,
        "delivery failed; falling back to direct download"
    );

    DIRECT_DOWNLOAD
        .deliver(failure.image, context)
        .map(|response| Delivered {
            response,
            kind: DeliveryKind::DirectDownload,
            fell_back: true,
        })
        .map_err(|fallback| DeliveryError {
            kind: DeliveryKind::DirectDownload,
            reason: fallback.reason,
        })
}
