//! RFox Snap
//!
//! Converts user-supplied markup into a PNG, JPEG or SVG artifact and can
//! composite a watermark image fetched from a remote URL on top of it.
//!
//! # Features
//!
//! - **Fallback loading**: remote watermarks are fetched through an ordered
//!   ladder of direct, cache-busted and proxied strategies
//! - **Taint tracking**: cross-origin pixels drawn without permission make the
//!   composed surface unexportable, exactly like a browser canvas
//! - **Graceful degradation**: a failed watermark never blocks delivery of the
//!   base conversion
//!
//! # Example
//!
//! ```no_run
//! use rfsnap::{BasicRenderer, ExportConfig, ExportOptions, Exporter, HttpFetcher, ImageFormat};
//!
//! # async fn run() -> rfsnap::Result<()> {
//! let config = ExportConfig::default();
//! let fetcher = HttpFetcher::new(&config)?;
//! let exporter = Exporter::new(BasicRenderer::new(), fetcher, config);
//!
//! let outcome = exporter
//!     .export("<h1>Hello</h1>", ImageFormat::Png, ExportOptions::default())
//!     .await?;
//! println!("{} ({} bytes)", outcome.filename, outcome.artifact.len());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub use error::{Error, Result};

pub mod artifact;
pub mod export;
pub mod loader;
pub mod rendering;
pub mod sink;
pub mod surface;
pub mod taint;
pub mod watermark;

// reqwest-backed remote fetch primitive
#[cfg(feature = "http")]
pub mod fetch;

pub use artifact::{FormatFamily, ImageArtifact, ImageFormat};
pub use export::{validate_watermark_url, ExportOutcome, Exporter, UrlValidation};
pub use loader::{CorsMode, FetchedImage, ImageFetcher, ImageLoader, LoadStrategy, LoadedImage};
pub use rendering::{BasicRenderer, RenderConfig, Renderer, VisualElement};
pub use surface::{RasterEncoder, Surface, SurfaceEncoder};
pub use watermark::{CompositionResult, WatermarkCompositor, WatermarkRequest};

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;

/// Engine-level configuration shared by every export
///
/// Defaults: five second direct fetches, ten second proxied fetches, two
/// public CORS relays and a short settle delay before the render target is
/// measured.
///
/// # Examples
///
/// ```
/// let cfg = rfsnap::ExportConfig::default();
/// assert_eq!(cfg.proxy_endpoints.len(), 2);
/// assert_eq!(cfg.direct_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// User agent string sent with image requests
    pub user_agent: String,
    /// Origin of the page hosting the converter (`None` is an opaque origin)
    pub page_origin: Option<String>,
    /// CORS relay templates; `{url}` is replaced with the raw target URL and
    /// `{encoded_url}` with its percent-encoded form
    pub proxy_endpoints: Vec<String>,
    /// Timeout for direct image fetches in milliseconds
    pub direct_timeout_ms: u64,
    /// Timeout for proxied image fetches in milliseconds
    pub proxy_timeout_ms: u64,
    /// Whether anonymous cross-origin fetches must be allowed by the server
    pub enforce_cors: bool,
    /// Largest watermark response body accepted, in bytes
    pub max_image_bytes: u64,
    /// Delay after building the render target before it is measured
    pub settle_delay_ms: u64,
    /// Extra delay after an explicit or minimum width is applied
    pub resize_settle_delay_ms: u64,
    /// Content narrower than this gets `min_content_width` applied
    pub narrow_width_threshold: u32,
    /// Minimum width forced onto narrow content
    pub min_content_width: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 RFOX/0.3 rfsnap/0.1".to_string(),
            page_origin: None,
            proxy_endpoints: loader::DEFAULT_PROXY_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            direct_timeout_ms: 5000,
            proxy_timeout_ms: 10000,
            enforce_cors: true,
            max_image_bytes: 16 * 1024 * 1024,
            settle_delay_ms: 300,
            resize_settle_delay_ms: 100,
            narrow_width_threshold: 400,
            min_content_width: 600,
        }
    }
}

impl ExportConfig {
    /// Load a configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// True when the hosting page was opened from a `file://` URL
    pub fn is_local_origin(&self) -> bool {
        self.page_origin
            .as_deref()
            .and_then(|o| url::Url::parse(o).ok())
            .is_some_and(|u| u.scheme() == "file")
    }
}

/// Per-export options, passed by value into every conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Background colour of the render target (CSS hex or a basic name)
    pub background_color: String,
    /// Device pixel ratio used for raster output
    pub pixel_ratio: u32,
    /// Quality for lossy output, `0.0..=1.0`
    pub quality: f32,
    /// Explicit output width; `None` lets the content size itself
    pub width: Option<u32>,
    /// Ask the rendering engine to bypass caches for embedded resources
    pub cache_bust: bool,
    /// Watermark to composite; `None` disables watermarking
    pub watermark: Option<WatermarkOptions>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            pixel_ratio: 1,
            quality: 0.95,
            width: None,
            cache_bust: false,
            watermark: None,
        }
    }
}

/// Watermark settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOptions {
    /// Absolute http(s) URL of the watermark image
    pub url: String,
    /// Paint opacity, `0.0..=1.0`
    #[serde(default = "default_watermark_opacity")]
    pub opacity: f32,
}

fn default_watermark_opacity() -> f32 {
    0.5
}

impl WatermarkOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            opacity: default_watermark_opacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.proxy_timeout_ms, 10000);
        assert_eq!(config.settle_delay_ms, 300);
        assert_eq!(config.min_content_width, 600);
        assert!(config.enforce_cors);
        assert_eq!(config.max_image_bytes, 16 * 1024 * 1024);
        assert!(!config.is_local_origin());
    }

    #[test]
    fn test_local_origin() {
        let config = ExportConfig {
            page_origin: Some("file:///home/me/index.html".into()),
            ..Default::default()
        };
        assert!(config.is_local_origin());

        let config = ExportConfig {
            page_origin: Some("http://localhost:8000".into()),
            ..Default::default()
        };
        assert!(!config.is_local_origin());
    }

    #[test]
    fn test_partial_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfsnap.json");
        std::fs::write(&path, r#"{ "proxy_endpoints": [], "direct_timeout_ms": 1500 }"#).unwrap();
        let cfg = ExportConfig::from_json_file(&path).unwrap();
        assert!(cfg.proxy_endpoints.is_empty());
        assert_eq!(cfg.direct_timeout_ms, 1500);
        assert_eq!(cfg.proxy_timeout_ms, 10000);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ExportConfig::from_json_file(&path), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_watermark_options_default_opacity() {
        let wm: WatermarkOptions = serde_json::from_str(r#"{ "url": "https://a.test/w.png" }"#).unwrap();
        assert_eq!(wm, WatermarkOptions::new("https://a.test/w.png"));
        assert_eq!(ExportOptions::default().pixel_ratio, 1);
    }
}
