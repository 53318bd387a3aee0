//! resvg rasterizer for card documents.

use std::{path::Path, sync::Arc};

use resvg::{
    tiny_skia::{Color, Pixmap, Transform},
    usvg::{self, fontdb},
};
use tracing::{debug, info};

use crate::{
    application::export::{RasterError, Rasterizer},
    domain::color::Rgb,
};

/// Largest edge, in pixels, a rasterized card may have.
const MAX_EDGE: f32 = 8192.0;

pub struct ResvgRasterizer {
    fontdb: Arc<fontdb::Database>,
}

impl ResvgRasterizer {
    /// Load system fonts plus any extra font directories once.
    pub fn new<P: AsRef<Path>>(font_dirs: &[P]) -> Self {
        let mut fontdb = fontdb::Database::new();
        fontdb.load_system_fonts();
        for dir in font_dirs {
            fontdb.load_fonts_dir(dir);
        }
        info!(
            target = "ritual_cards::raster",
            faces = fontdb.len(),
            extra_dirs = font_dirs.len(),
            "font database loaded"
        );
        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    fn options(&self) -> usvg::Options<'static> {
        usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        }
    }
}

impl Rasterizer for ResvgRasterizer {
    fn rasterize(&self, svg: &str, background: Rgb, density: f32) -> Result<Vec<u8>, RasterError> {
        let tree = usvg::Tree::from_str(svg, &self.options())
            .map_err(|err| RasterError::Parse(err.to_string()))?;

        let size = tree.size();
        let width = (size.width() * density).ceil();
        let height = (size.height() * density).ceil();
        if !(1.0..=MAX_EDGE).contains(&width) || !(1.0..=MAX_EDGE).contains(&height) {
            return Err(RasterError::Allocation {
                width: width as u32,
                height: height as u32,
            });
        }
        let (width, height) = (width as u32, height as u32);

        let mut pixmap =
            Pixmap::new(width, height).ok_or(RasterError::Allocation { width, height })?;
        pixmap.fill(Color::from_rgba8(background.r, background.g, background.b, 255));

        resvg::render(
            &tree,
            Transform::from_scale(density, density),
            &mut pixmap.as_mut(),
        );

        let png = pixmap
            .encode_png()
            .map_err(|err| RasterError::Encode(err.to_string()))?;
        debug!(
            target = "ritual_cards::raster",
            width,
            height,
            density,
            bytes = png.len(),
            "card rasterized"
        );
        Ok(png)
    }
}
