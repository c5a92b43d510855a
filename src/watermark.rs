//! Watermark compositing.
//!
//! The compositor never fails past its boundary: any problem on the
//! watermark path turns into [`CompositionResult::Failed`], which still
//! carries the untouched base artifact so the caller can deliver it.

use crate::artifact::{FormatFamily, ImageArtifact, ImageFormat};
use crate::loader::{ImageFetcher, ImageLoader};
use crate::surface::{decode_artifact, DrawRect, Surface, SurfaceEncoder};
use crate::taint::is_tainted;
use crate::{Error, Result};
use log::{debug, warn};

/// Largest share of the canvas a watermark may cover on either axis
pub const MAX_WATERMARK_FRACTION: f64 = 0.25;

/// Inset of the watermark from the right and bottom edges
pub const WATERMARK_INSET: f64 = 20.0;

/// A single watermarking job, created per export and consumed once
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkRequest {
    pub source_url: String,
    /// Paint opacity in `[0, 1]`
    pub opacity: f32,
    pub target_format: ImageFormat,
    /// Quality reused when re-encoding lossy output
    pub quality: f32,
}

/// Outcome of [`WatermarkCompositor::composite`]
#[derive(Debug)]
pub enum CompositionResult {
    /// The watermark was applied
    Composited(ImageArtifact),
    /// Watermarking does not apply to this format; the base is returned as is
    Skipped { artifact: ImageArtifact, notice: String },
    /// Watermarking failed; `fallback` is the unmodified base artifact
    Failed { fallback: ImageArtifact, error: Error },
}

impl CompositionResult {
    /// The artifact to deliver, whatever happened
    pub fn into_artifact(self) -> ImageArtifact {
        match self {
            CompositionResult::Composited(a) => a,
            CompositionResult::Skipped { artifact, .. } => artifact,
            CompositionResult::Failed { fallback, .. } => fallback,
        }
    }

    /// User-facing warning, if any
    pub fn warning(&self) -> Option<String> {
        match self {
            CompositionResult::Composited(_) => None,
            CompositionResult::Skipped { notice, .. } => Some(notice.clone()),
            CompositionResult::Failed { error, .. } => Some(format!("Watermark failed: {}", error)),
        }
    }

    pub fn is_composited(&self) -> bool {
        matches!(self, CompositionResult::Composited(_))
    }
}

/// Size of a watermark drawn on a `canvas_w` x `canvas_h` canvas.
///
/// Oversized watermarks shrink uniformly until both axes fit within a quarter
/// of the canvas; smaller ones keep their natural size.
pub fn fit_watermark(natural_w: f64, natural_h: f64, canvas_w: f64, canvas_h: f64) -> (f64, f64) {
    let max_w = canvas_w * MAX_WATERMARK_FRACTION;
    let max_h = canvas_h * MAX_WATERMARK_FRACTION;
    if natural_w > max_w || natural_h > max_h {
        let scale = (max_w / natural_w).min(max_h / natural_h);
        (natural_w * scale, natural_h * scale)
    } else {
        (natural_w, natural_h)
    }
}

/// Bottom-right placement with a fixed inset
pub fn place_watermark(width: f64, height: f64, canvas_w: f64, canvas_h: f64) -> DrawRect {
    DrawRect {
        x: canvas_w - width - WATERMARK_INSET,
        y: canvas_h - height - WATERMARK_INSET,
        width,
        height,
    }
}

/// Composites a remote watermark onto raster artifacts.
pub struct WatermarkCompositor<'a, F> {
    loader: &'a ImageLoader<F>,
    encoder: &'a dyn SurfaceEncoder,
}

impl<'a, F: ImageFetcher> WatermarkCompositor<'a, F> {
    pub fn new(loader: &'a ImageLoader<F>, encoder: &'a dyn SurfaceEncoder) -> Self {
        Self { loader, encoder }
    }

    pub async fn composite(&self, base: &ImageArtifact, request: &WatermarkRequest) -> CompositionResult {
        if request.target_format.is_vector() {
            debug!("Watermark not supported for {}", request.target_format);
            return CompositionResult::Skipped {
                artifact: base.clone(),
                notice: format!(
                    "watermark not supported for this format: {}",
                    request.target_format
                ),
            };
        }

        match self.try_composite(base, request).await {
            Ok(artifact) => CompositionResult::Composited(artifact),
            Err(error) => {
                warn!("Watermark error: {}", error);
                CompositionResult::Failed { fallback: base.clone(), error }
            }
        }
    }

    async fn try_composite(&self, base: &ImageArtifact, request: &WatermarkRequest) -> Result<ImageArtifact> {
        let url = request.source_url.trim();
        if url.is_empty() {
            return Err(Error::ConfigError("Watermark URL is required".into()));
        }

        let base_pixels = decode_artifact(base)?;
        let (cw, ch) = base_pixels.dimensions();
        let mut surface = Surface::new(cw, ch);
        surface.draw_image(
            &base_pixels,
            true,
            DrawRect { x: 0.0, y: 0.0, width: f64::from(cw), height: f64::from(ch) },
        );

        let watermark = self.loader.load(url).await?;

        let (w, h) = fit_watermark(
            f64::from(watermark.width()),
            f64::from(watermark.height()),
            f64::from(cw),
            f64::from(ch),
        );
        let rect = place_watermark(w, h, f64::from(cw), f64::from(ch));
        debug!(
            "Placing {}x{} watermark at ({:.1}, {:.1}) as {:.1}x{:.1}",
            watermark.width(),
            watermark.height(),
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );

        surface.set_global_alpha(request.opacity);
        surface.draw_image(&watermark.image, !watermark.tainted, rect);
        surface.set_global_alpha(1.0);

        if is_tainted(&surface) {
            return Err(Error::TaintError { url: url.to_string() });
        }

        // Output keeps the base artifact's family, never the watermark's
        let format = match base.format().family() {
            FormatFamily::LosslessRaster => ImageFormat::Png,
            FormatFamily::LossyRaster => ImageFormat::Jpeg,
            FormatFamily::Vector => base.format(),
        };
        self.encoder.encode(&surface, format, request.quality)
    }
}
