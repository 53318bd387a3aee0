//! Card rendering.
//!
//! Binding a profile and a tier to a [`CardView`] is pure. Turning the view
//! into a rasterization-ready SVG document first runs the image barrier:
//! every embedded image is loaded one after another and inlined as a `data:`
//! URI, so the rasterizer never touches the network. A failed load only
//! costs that image; the card falls back to the initial-letter placeholder.

mod loader;
mod view;

use std::sync::Arc;

use askama::Template;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    domain::{profile::ProfileRecord, role::RoleTier},
    presentation::views::CardSvgTemplate,
};

pub use loader::{ImageLoadError, ImageLoader, LoadedImage, RelayImageLoader};
pub use view::{BioLineView, CARD_HEIGHT, CARD_WIDTH, CardView, StarView, StatView};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("card template failed to render")]
    Template(#[from] askama::Error),
}

/// A card whose images have settled, serialized as a standalone SVG document.
#[derive(Debug, Clone)]
pub struct ReadyCard {
    pub view: CardView,
    pub svg: String,
}

pub struct CardRenderer {
    loader: Arc<dyn ImageLoader>,
}

impl CardRenderer {
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self { loader }
    }

    pub async fn prepare(
        &self,
        profile: &ProfileRecord,
        role: RoleTier,
    ) -> Result<ReadyCard, RenderError> {
        let view = self.settle_images(CardView::bind(profile, role)).await;
        let svg = CardSvgTemplate { view: &view }.render()?;
        Ok(ReadyCard { view, svg })
    }

    /// Load every embedded image before the view is handed to the template.
    async fn settle_images(&self, mut view: CardView) -> CardView {
        let sources: Vec<String> = view.image_sources().map(str::to_string).collect();

        for src in sources {
            match self.loader.load(&src).await {
                Ok(image) => {
                    debug!(
                        target = "ritual_cards::render",
                        src = %src,
                        mime = image.mime,
                        width = image.width,
                        height = image.height,
                        "card image loaded"
                    );
                    view.avatar_src = Some(image.data_uri());
                }
                Err(err) => {
                    warn!(
                        target = "ritual_cards::render",
                        src = %src,
                        error = %err,
                        "card image failed to load; using placeholder"
                    );
                    view.avatar_src = None;
                }
            }
        }

        view
    }
}
