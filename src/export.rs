//! Export orchestration: validate, render, optionally watermark.

use crate::artifact::{ImageArtifact, ImageFormat};
use crate::loader::{ImageFetcher, ImageLoader};
use crate::rendering::{RenderConfig, Renderer, VisualElement};
use crate::surface::{RasterEncoder, SurfaceEncoder};
use crate::watermark::{WatermarkCompositor, WatermarkRequest};
use crate::{Error, ExportConfig, ExportOptions, Result};
use log::{debug, info, warn};
use std::time::Duration;
use url::Url;

const IMAGE_EXTENSIONS: [&str; 7] = [".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg"];

/// Largest explicit output width accepted, in CSS pixels
pub const MAX_EXPLICIT_WIDTH: u32 = 8192;

/// Data URIs shorter than this are treated as an empty render
const MIN_DATA_URI_LEN: usize = 100;

const LOCAL_SERVER_HINT: &str = "Try serving the page over HTTP instead of opening it from a file";

const LOCAL_ORIGIN_WARNING: &str = "Running from file:// may cause issues with remote watermark images. \
For best results, serve this page over HTTP (e.g. python -m http.server 8000)";

/// Outcome of watermark URL validation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlValidation {
    Valid,
    /// Usable, but worth telling the user about
    ValidWithWarning(String),
}

/// Check a watermark URL before any rendering starts.
///
/// The URL must be non-empty, absolute and use `http` or `https`. A path
/// without a known image extension is accepted with a warning.
pub fn validate_watermark_url(url: &str) -> Result<UrlValidation> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::ConfigError(
            "Watermark URL is required when watermark is enabled".into(),
        ));
    }

    let parsed = Url::parse(url).map_err(|_| Error::ConfigError("Invalid URL format".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::ConfigError(
            "Watermark URL must use HTTP or HTTPS protocol".into(),
        ));
    }

    let path = parsed.path().to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        Ok(UrlValidation::Valid)
    } else {
        Ok(UrlValidation::ValidWithWarning(
            "Warning: URL doesn't appear to be an image file".into(),
        ))
    }
}

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub artifact: ImageArtifact,
    /// Non-blocking problems to show next to the image
    pub warnings: Vec<String>,
    /// Suggested download name
    pub filename: String,
}

/// Converts markup into image artifacts.
pub struct Exporter<R, F> {
    renderer: R,
    loader: ImageLoader<F>,
    encoder: Box<dyn SurfaceEncoder>,
    config: ExportConfig,
}

impl<R: Renderer, F: ImageFetcher> Exporter<R, F> {
    pub fn new(renderer: R, fetcher: F, config: ExportConfig) -> Self {
        Self {
            renderer,
            loader: ImageLoader::new(fetcher, &config),
            encoder: Box::new(RasterEncoder),
            config,
        }
    }

    /// Replace the encoder used to re-encode watermarked surfaces
    pub fn with_encoder(mut self, encoder: impl SurfaceEncoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn loader(&self) -> &ImageLoader<F> {
        &self.loader
    }

    /// Convert `markup` into `format`.
    ///
    /// Only configuration and render errors are returned as `Err`; every
    /// watermark problem ends up in [`ExportOutcome::warnings`] with the
    /// unwatermarked image delivered instead.
    pub async fn export(&self, markup: &str, format: ImageFormat, options: ExportOptions) -> Result<ExportOutcome> {
        if markup.trim().is_empty() {
            return Err(Error::ConfigError("Please enter some HTML content first".into()));
        }

        if let Some(width) = options.width.filter(|w| *w > MAX_EXPLICIT_WIDTH) {
            return Err(Error::ConfigError(format!(
                "Width {}px exceeds the maximum of {}px",
                width, MAX_EXPLICIT_WIDTH
            )));
        }

        let mut warnings = Vec::new();
        if self.config.is_local_origin() {
            warn!("{}", LOCAL_ORIGIN_WARNING);
            warnings.push(LOCAL_ORIGIN_WARNING.to_string());
        }
        if let Some(wm) = &options.watermark {
            if let UrlValidation::ValidWithWarning(w) = validate_watermark_url(&wm.url)? {
                warn!("{}", w);
                warnings.push(w);
            }
        }

        let element = self.prepare_element(markup, &options).await;
        let render_config = RenderConfig::from_options(&options);
        let base = self.render(&element, &render_config, format, options.quality).await?;

        let artifact = match &options.watermark {
            Some(wm) => {
                let request = WatermarkRequest {
                    source_url: wm.url.clone(),
                    opacity: wm.opacity,
                    target_format: format,
                    quality: options.quality,
                };
                let compositor = WatermarkCompositor::new(&self.loader, self.encoder.as_ref());
                let result = compositor.composite(&base, &request).await;
                if let Some(w) = result.warning() {
                    warnings.push(w);
                }
                result.into_artifact()
            }
            None => base,
        };

        info!(
            "Converted to {} ({} bytes, {} warning(s))",
            format.label(),
            artifact.len(),
            warnings.len()
        );
        let filename = artifact.default_filename();
        Ok(ExportOutcome { artifact, warnings, filename })
    }

    // Fresh per call; never shared between exports.
    async fn prepare_element(&self, markup: &str, options: &ExportOptions) -> VisualElement {
        let mut element = VisualElement::new(markup, options.background_color.clone());
        settle(self.config.settle_delay_ms).await;

        match options.width.filter(|w| *w > 0) {
            Some(width) => {
                element.set_width(width);
                settle(self.config.resize_settle_delay_ms).await;
            }
            None => {
                let (natural, _) = element.measure();
                if natural < self.config.narrow_width_threshold {
                    debug!("Content is {}px wide, applying minimum width", natural);
                    element.set_min_width(self.config.min_content_width);
                    settle(self.config.resize_settle_delay_ms).await;
                }
            }
        }

        let (w, h) = element.measure();
        debug!("Render target measures {}x{}", w, h);
        element
    }

    async fn render(
        &self,
        element: &VisualElement,
        config: &RenderConfig,
        format: ImageFormat,
        quality: f32,
    ) -> Result<ImageArtifact> {
        let rendered = self
            .renderer
            .render(element, config, format, quality)
            .await
            .and_then(|artifact| {
                if artifact.to_data_uri().len() < MIN_DATA_URI_LEN {
                    Err(Error::RenderError {
                        format: format.label().to_string(),
                        reason: "Generated image is empty or invalid".into(),
                    })
                } else {
                    Ok(artifact)
                }
            });

        rendered.map_err(|e| {
            let (label, mut reason) = match e {
                Error::RenderError { format: label, reason } => (label, reason),
                other => (format.label().to_string(), other.to_string()),
            };
            if self.config.is_local_origin() {
                reason = format!("{}. {}", reason, LOCAL_SERVER_HINT);
            }
            Error::RenderError { format: label, reason }
        })
    }
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::*;
    use crate::rendering::BasicRenderer;
    use crate::surface::decode_artifact;
    use crate::WatermarkOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WM: &str = "https://img.example.com/logo.png";

    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render_png(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BasicRenderer.render_png(element, config).await
        }

        async fn render_jpeg(&self, element: &VisualElement, config: &RenderConfig, quality: f32) -> Result<ImageArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BasicRenderer.render_jpeg(element, config, quality).await
        }

        async fn render_svg(&self, element: &VisualElement, config: &RenderConfig) -> Result<ImageArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BasicRenderer.render_svg(element, config).await
        }
    }

    struct BlankRenderer;

    #[async_trait]
    impl Renderer for BlankRenderer {
        async fn render_png(&self, _: &VisualElement, _: &RenderConfig) -> Result<ImageArtifact> {
            Ok(ImageArtifact::new(ImageFormat::Png, Vec::new()))
        }

        async fn render_jpeg(&self, _: &VisualElement, _: &RenderConfig, _: f32) -> Result<ImageArtifact> {
            Err(Error::EncodeError("no encoder".into()))
        }

        async fn render_svg(&self, _: &VisualElement, _: &RenderConfig) -> Result<ImageArtifact> {
            Ok(ImageArtifact::new(ImageFormat::Svg, b"<svg/>".to_vec()))
        }
    }

    fn exporter(fetcher: ScriptedFetcher) -> Exporter<CountingRenderer, ScriptedFetcher> {
        Exporter::new(CountingRenderer::default(), fetcher, quick_config())
    }

    fn with_watermark(url: &str) -> ExportOptions {
        ExportOptions {
            watermark: Some(WatermarkOptions::new(url)),
            ..Default::default()
        }
    }

    #[test]
    fn url_validation() {
        assert_eq!(validate_watermark_url(WM).unwrap(), UrlValidation::Valid);
        assert_eq!(
            validate_watermark_url("https://a.test/Logo.JPEG?size=2").unwrap(),
            UrlValidation::Valid
        );
        assert!(matches!(
            validate_watermark_url("https://a.test/logo").unwrap(),
            UrlValidation::ValidWithWarning(w) if w.contains("doesn't appear to be an image file")
        ));

        for (url, msg) in [
            ("", "required"),
            ("not a url", "Invalid URL format"),
            ("ftp://a.test/logo.png", "HTTP or HTTPS"),
            ("data:image/png;base64,AAAA", "HTTP or HTTPS"),
        ] {
            let err = validate_watermark_url(url).unwrap_err();
            assert!(err.is_blocking());
            assert!(err.to_string().contains(msg), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn blocking_errors_skip_rendering() {
        let ex = exporter(ScriptedFetcher::failing());
        for (markup, options) in [
            ("   ", ExportOptions::default()),
            ("<p>x</p>", with_watermark("not a url")),
            ("<p>x</p>", with_watermark("ftp://a.test/logo.png")),
            ("<p>x</p>", with_watermark("")),
        ] {
            let err = ex.export(markup, ImageFormat::Png, options).await.unwrap_err();
            assert!(matches!(err, Error::ConfigError(_)), "{err}");
        }
        assert_eq!(ex.renderer().calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.loader().fetcher().call_count(), 0);
    }

    #[tokio::test]
    async fn plain_png_export() {
        let ex = exporter(ScriptedFetcher::failing());
        let out = ex.export("<h1>Hello</h1>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.filename, "converted-image.png");
        let uri = out.artifact.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.len() > 100);
    }

    #[tokio::test]
    async fn vector_watermark_is_skipped_with_warning() {
        let ex = exporter(ScriptedFetcher::serving(4, 4, [0, 0, 0, 255]));
        let out = ex.export("<p>svg</p>", ImageFormat::Svg, with_watermark(WM)).await.unwrap();
        assert_eq!(out.artifact.format(), ImageFormat::Svg);
        assert!(out.warnings.iter().any(|w| w.contains("watermark not supported for this format")));
        assert_eq!(out.filename, "converted-image.svg");
        assert_eq!(ex.loader().fetcher().call_count(), 0);
    }

    #[tokio::test]
    async fn failed_watermark_delivers_plain_image() {
        let ex = exporter(ScriptedFetcher::failing());
        let plain = ex.export("<p>base</p>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        let out = ex.export("<p>base</p>", ImageFormat::Png, with_watermark(WM)).await.unwrap();

        assert_eq!(out.artifact, plain.artifact);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("Watermark failed:"));
        assert!(out.warnings[0].contains(WM));
    }

    #[tokio::test]
    async fn watermark_is_composited() {
        let ex = exporter(ScriptedFetcher::serving(40, 20, [255, 0, 0, 255]));
        let plain = ex.export("<p>base</p>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        let out = ex.export("<p>base</p>", ImageFormat::Png, with_watermark(WM)).await.unwrap();

        assert!(out.warnings.is_empty());
        assert_ne!(out.artifact, plain.artifact);
        let (pw, ph) = decode_artifact(&plain.artifact).unwrap().dimensions();
        assert_eq!(decode_artifact(&out.artifact).unwrap().dimensions(), (pw, ph));
    }

    #[tokio::test]
    async fn extensionless_url_warns_but_exports() {
        let ex = exporter(ScriptedFetcher::serving(4, 4, [0, 0, 0, 255]));
        let out = ex
            .export("<p>x</p>", ImageFormat::Png, with_watermark("https://img.example.com/logo"))
            .await
            .unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("doesn't appear to be an image file")));
        assert_eq!(ex.loader().fetcher().call_count(), 1);
    }

    #[tokio::test]
    async fn local_origin_adds_warning() {
        let config = ExportConfig {
            page_origin: Some("file:///home/me/index.html".into()),
            ..quick_config()
        };
        let ex = Exporter::new(CountingRenderer::default(), ScriptedFetcher::failing(), config);
        let out = ex.export("<p>x</p>", ImageFormat::Png, with_watermark(WM)).await.unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("file://")));
        assert_eq!(ex.loader().fetcher().call_count(), 2);

        let out = ex.export("<p>x</p>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert_eq!(out.warnings, vec![LOCAL_ORIGIN_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn oversized_width_is_rejected_before_rendering() {
        let ex = exporter(ScriptedFetcher::failing());
        for width in [MAX_EXPLICIT_WIDTH + 1, 500_000, 3_000_000_000] {
            let opts = ExportOptions { width: Some(width), pixel_ratio: 2, ..Default::default() };
            let err = ex.export("<div>hello</div>", ImageFormat::Png, opts).await.unwrap_err();
            assert!(matches!(err, Error::ConfigError(_)), "{err}");
            assert!(err.is_blocking());
        }
        assert_eq!(ex.renderer().calls.load(Ordering::SeqCst), 0);

        let opts = ExportOptions { width: Some(MAX_EXPLICIT_WIDTH), ..Default::default() };
        let out = ex.export("<div>hello</div>", ImageFormat::Png, opts).await.unwrap();
        assert_eq!(decode_artifact(&out.artifact).unwrap().width(), MAX_EXPLICIT_WIDTH);
    }

    #[tokio::test]
    async fn repeated_exports_agree() {
        let ex = exporter(ScriptedFetcher::failing());
        let opts = ExportOptions { quality: 0.8, ..Default::default() };
        let a = ex.export("<p>same</p>", ImageFormat::Jpeg, opts.clone()).await.unwrap();
        let b = ex.export("<p>same</p>", ImageFormat::Jpeg, opts).await.unwrap();
        assert_eq!(a.artifact.format(), b.artifact.format());
        assert_eq!(
            decode_artifact(&a.artifact).unwrap().dimensions(),
            decode_artifact(&b.artifact).unwrap().dimensions()
        );
        assert_eq!(a.filename, "converted-image.jpg");
    }

    #[tokio::test]
    async fn sizing_rules() {
        let ex = exporter(ScriptedFetcher::failing());
        let size = |out: ExportOutcome| decode_artifact(&out.artifact).unwrap().dimensions();

        // narrow content gets the minimum width
        let out = ex.export("<div>hello</div>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert_eq!(size(out), (600, 100));

        // explicit width wins
        let opts = ExportOptions { width: Some(800), ..Default::default() };
        let out = ex.export("<div>hello</div>", ImageFormat::Png, opts).await.unwrap();
        assert_eq!(size(out).0, 800);

        // content past the threshold keeps its natural width
        let wide = format!("<div>{}</div>", "x".repeat(60));
        let out = ex.export(&wide, ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert_eq!(size(out).0, 532);
    }

    #[tokio::test]
    async fn render_problems_are_blocking() {
        let ex = Exporter::new(BlankRenderer, ScriptedFetcher::failing(), quick_config());

        let err = ex.export("<p>x</p>", ImageFormat::Png, ExportOptions::default()).await.unwrap_err();
        assert!(err.is_blocking());
        assert_eq!(err.to_string(), "Failed to convert to PNG: Generated image is empty or invalid");

        let err = ex.export("<p>x</p>", ImageFormat::Jpeg, ExportOptions::default()).await.unwrap_err();
        assert!(matches!(&err, Error::RenderError { format, .. } if format == "JPEG"));
        assert!(err.to_string().contains("no encoder"));
    }

    #[tokio::test]
    async fn local_origin_render_errors_carry_server_hint() {
        let config = ExportConfig {
            page_origin: Some("file:///home/me/index.html".into()),
            ..quick_config()
        };
        let ex = Exporter::new(BlankRenderer, ScriptedFetcher::failing(), config);
        let err = ex.export("<p>x</p>", ImageFormat::Png, ExportOptions::default()).await.unwrap_err();
        assert!(err.is_blocking());
        assert!(err.to_string().contains("Generated image is empty or invalid"));
        assert!(err.to_string().ends_with(LOCAL_SERVER_HINT), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delays_apply_before_rendering() {
        let ex = Exporter::new(BasicRenderer::new(), ScriptedFetcher::failing(), ExportConfig::default());
        let started = tokio::time::Instant::now();
        ex.export("<div>hello</div>", ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(400));

        let started = tokio::time::Instant::now();
        let wide = format!("<div>{}</div>", "x".repeat(60));
        ex.export(&wide, ImageFormat::Png, ExportOptions::default()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }
}
