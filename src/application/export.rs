//! Image export: card SVG to PNG bytes, with a single reduced-density retry.

use std::{fmt, sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{color::Rgb, handle::ArtifactName};

use super::render::ReadyCard;

const METRIC_RASTER_MS: &str = "ritual_raster_ms";
const METRIC_RASTER_RETRY_TOTAL: &str = "ritual_raster_retry_total";

pub const DEFAULT_HIGH_DENSITY: f32 = 2.0;
pub const DEFAULT_REDUCED_DENSITY: f32 = 1.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("card document could not be parsed: {0}")]
    Parse(String),
    #[error("pixel buffer of {width}x{height} could not be allocated")]
    Allocation { width: u32, height: u32 },
    #[error("png encoding failed: {0}")]
    Encode(String),
    #[error("rasterizer produced no output")]
    Empty,
    #[error("rasterizer task aborted: {0}")]
    Aborted(String),
}

/// Draws an SVG document into PNG bytes. Runs on the blocking pool.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, svg: &str, background: Rgb, density: f32) -> Result<Vec<u8>, RasterError>;
}

#[derive(Debug, Error)]
#[error("rasterization failed at density {high} ({first}) and at {reduced} ({second})")]
pub struct ExportError {
    pub high: f32,
    pub reduced: f32,
    #[source]
    pub first: RasterError,
    pub second: RasterError,
}

/// PNG bytes produced by one export. Moved into exactly one delivery.
pub struct GeneratedImage {
    name: ArtifactName,
    bytes: Bytes,
    density: f32,
}

impl GeneratedImage {
    pub fn new(name: ArtifactName, bytes: Bytes, density: f32) -> Self {
        Self {
            name,
            bytes,
            density,
        }
    }

    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn into_parts(self) -> (ArtifactName, Bytes) {
        (self.name, self.bytes)
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("density", &self.density)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    pub high_density: f32,
    pub reduced_density: f32,
    pub background: Rgb,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            high_density: DEFAULT_HIGH_DENSITY,
            reduced_density: DEFAULT_REDUCED_DENSITY,
            background: Rgb::new(0x0b, 0x0b, 0x12),
        }
    }
}

pub struct ImageExporter {
    rasterizer: Arc<dyn Rasterizer>,
    settings: ExportSettings,
}

impl ImageExporter {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, settings: ExportSettings) -> Self {
        Self {
            rasterizer,
            settings,
        }
    }

    /// Rasterize at high density, then once more at reduced density.
    pub async fn export(
        &self,
        card: &ReadyCard,
        name: ArtifactName,
    ) -> Result<GeneratedImage, ExportError> {
        let svg: Arc<str> = Arc::from(card.svg.as_str());
        let ExportSettings {
            high_density,
            reduced_density,
            ..
        } = self.settings;

        let first = match self.attempt(Arc::clone(&svg), high_density).await {
            Ok(bytes) => return Ok(self.finish(name, bytes, high_density)),
            Err(err) => err,
        };

        warn!(
            target = "ritual_cards::export",
            density = high_density,
            retry_density = reduced_density,
            error = %first,
            "rasterization failed; retrying at reduced density"
        );
        counter!(METRIC_RASTER_RETRY_TOTAL).increment(1);

        match self.attempt(svg, reduced_density).await {
            Ok(bytes) => Ok(self.finish(name, bytes, reduced_density)),
            Err(second) => Err(ExportError {
                high: high_density,
                reduced: reduced_density,
                first,
                second,
            }),
        }
    }

    async fn attempt(&self, svg: Arc<str>, density: f32) -> Result<Vec<u8>, RasterError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let background = self.settings.background;
        let started_at = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            rasterizer.rasterize(&svg, background, density)
        })
        .await
        .map_err(|err| RasterError::Aborted(err.to_string()))
        .and_then(|outcome| outcome)
        .and_then(|bytes| {
            if bytes.is_empty() {
                Err(RasterError::Empty)
            } else {
                Ok(bytes)
            }
        });

        histogram!(
            METRIC_RASTER_MS,
            "outcome" => if result.is_ok() { "ok" } else { "error" }
        )
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn finish(&self, name: ArtifactName, bytes: Vec<u8>, density: f32) -> GeneratedImage {
        info!(
            target = "ritual_cards::export",
            artifact = %name,
            density,
            size = %crate::util::format::format_bytes(bytes.len() as u64),
            "card rasterized"
        );
        GeneratedImage::new(name, Bytes::from(bytes), density)
    }
}
