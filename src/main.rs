//! `rfsnap`: convert a markup file into an image, optionally watermarked.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rfsnap::sink::{ArtifactSink, FileSink, StreamSink};
use rfsnap::{
    BasicRenderer, ExportConfig, ExportOptions, Exporter, HttpFetcher, ImageFormat, WatermarkOptions,
};

#[derive(Parser, Debug)]
#[command(about = "Convert HTML markup into a PNG, JPEG or SVG image", version)]
struct Args {
    /// Markup file to convert, or `-` for stdin
    input: PathBuf,

    /// Output format: png, jpeg or svg
    #[arg(short, long, default_value = "png")]
    format: ImageFormat,

    /// Output path (defaults to `converted-image.<ext>` in the current directory)
    #[arg(short, long, conflicts_with = "stdout")]
    output: Option<PathBuf>,

    /// Write the image to stdout, e.g. for piping into a clipboard tool
    #[arg(long)]
    stdout: bool,

    /// Background colour of the render target
    #[arg(long, default_value = "#ffffff")]
    background: String,

    /// Device pixel ratio for raster output
    #[arg(long, default_value_t = 1)]
    pixel_ratio: u32,

    /// JPEG quality between 0 and 1
    #[arg(long, default_value_t = 0.95)]
    quality: f32,

    /// Explicit output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Bypass caches for resources embedded in the markup
    #[arg(long)]
    cache_bust: bool,

    /// Composite the image at this URL in the bottom-right corner
    #[arg(long)]
    watermark_url: Option<String>,

    /// Watermark opacity between 0 and 1
    #[arg(long, default_value_t = 0.5)]
    watermark_opacity: f32,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Origin of the hosting page, overriding the configuration
    #[arg(long)]
    origin: Option<String>,
}

fn read_markup(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read markup from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };
    if args.origin.is_some() {
        config.page_origin = args.origin.clone();
    }

    let markup = read_markup(&args.input)?;
    let options = ExportOptions {
        background_color: args.background.clone(),
        pixel_ratio: args.pixel_ratio,
        quality: args.quality.clamp(0.0, 1.0),
        width: args.width,
        cache_bust: args.cache_bust,
        watermark: args.watermark_url.as_ref().map(|url| WatermarkOptions {
            url: url.clone(),
            opacity: args.watermark_opacity.clamp(0.0, 1.0),
        }),
    };

    let fetcher = HttpFetcher::new(&config)?;
    let exporter = Exporter::new(BasicRenderer::new(), fetcher, config);
    let outcome = exporter.export(&markup, args.format, options).await?;

    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }

    if args.stdout {
        StreamSink::stdout().deliver(&outcome.artifact)?;
    } else {
        let path = args.output.unwrap_or_else(|| PathBuf::from(&outcome.filename));
        FileSink::new(&path).deliver(&outcome.artifact)?;
        eprintln!("{} ({} bytes)", path.display(), outcome.artifact.len());
    }
    Ok(())
}
