//! Rendering engine seam and the built-in renderer.

pub mod element;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod svg;

pub use element::{ElementStyle, VisualElement};

use crate::artifact::{ImageArtifact, ImageFormat};
use crate::surface::encode_rgba;
use crate::{Error, ExportOptions, Result};
use async_trait::async_trait;
use image::RgbaImage;
use log::warn;
use std::collections::BTreeMap;

/// Highest device pixel ratio honoured by the built-in renderer
pub const MAX_PIXEL_RATIO: u32 = 4;

/// Configuration handed to the rendering engine
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub background_color: String,
    pub pixel_ratio: u32,
    pub cache_bust: bool,
    pub use_cors: bool,
    pub allow_taint: bool,
    /// Style overrides applied to the cloned render target
    pub style: BTreeMap<String, String>,
}

impl RenderConfig {
    pub fn from_options(options: &ExportOptions) -> Self {
        let style = [
            ("transform", "scale(1)"),
            ("transform-origin", "top left"),
            ("box-sizing", "border-box"),
            ("max-width", "none"),
            ("max-height", "none"),
            ("overflow", "visible"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            background_color: options.background_color.clone(),
            pixel_ratio: options.pixel_ratio,
            cache_bust: options.cache_bust,
            use_cors: true,
            allow_taint: false,
            style,
        }
    }
}

/// A markup-to-image rendering engine, one entry point per output format.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render_png(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact>;

    async fn render_jpeg(&self, element: &VisualElement, config: &RenderConfig, quality: f32) -> Result<ImageArtifact>;

    async fn render_svg(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact>;

    /// Dispatch on `format`
    async fn render(
        &self,
        element: &VisualElement,
        config: &RenderConfig,
        format: ImageFormat,
        quality: f32,
    ) -> Result<ImageArtifact> {
        match format {
            ImageFormat::Png => self.render_png(element, config).await,
            ImageFormat::Jpeg => self.render_jpeg(element, config, quality).await,
            ImageFormat::Svg => self.render_svg(element, config).await,
        }
    }
}

/// Pure-Rust renderer: block layout, block glyphs, no font stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRenderer;

impl BasicRenderer {
    pub fn new() -> Self {
        BasicRenderer
    }

    fn rasterize(&self, element: &VisualElement, config: &RenderConfig, format: ImageFormat) -> Result<RgbaImage> {
        let layout = element.layout();
        let background = paint::parse_color(&config.background_color).unwrap_or_else(|| {
            warn!("Unrecognised background colour {:?}, using white", config.background_color);
            (0xff, 0xff, 0xff, 0xff)
        });
        let commands = paint::build_display_list(&layout, background);
        raster::rasterize(
            &commands,
            layout.width,
            layout.height,
            config.pixel_ratio.clamp(1, MAX_PIXEL_RATIO),
        )
        .map_err(|e| Error::RenderError {
            format: format.label().to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(&self, pixels: &RgbaImage, format: ImageFormat, quality: f32) -> Result<ImageArtifact> {
        encode_rgba(pixels, format, quality).map_err(|e| Error::RenderError {
            format: format.label().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Renderer for BasicRenderer {
    async fn render_png(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact> {
        let pixels = self.rasterize(element, config, ImageFormat::Png)?;
        self.encode(&pixels, ImageFormat::Png, 1.0)
    }

    async fn render_jpeg(&self, element: &VisualElement, config: &RenderConfig, quality: f32) -> Result<ImageArtifact> {
        let pixels = self.rasterize(element, config, ImageFormat::Jpeg)?;
        self.encode(&pixels, ImageFormat::Jpeg, quality)
    }

    async fn render_svg(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact> {
        let doc = svg::svg_document(element, config);
        Ok(ImageArtifact::new(ImageFormat::Svg, doc.into_bytes()))
    }
}
