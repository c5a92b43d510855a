//! Off-screen drawing surface used for compositing.
//!
//! The surface tracks cross-origin taint at draw time: drawing pixels that did
//! not come from an origin-clean source marks the whole surface unreadable,
//! after which pixel read-back and encoding both fail with a security error.

use crate::artifact::{ImageArtifact, ImageFormat};
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};

/// JPEG quality used when the caller passes a non-finite value
const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Destination rectangle in surface units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A drawable RGBA surface with a global paint alpha.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
    global_alpha: f32,
    origin_clean: bool,
}

impl Surface {
    /// Create a fully transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            global_alpha: 1.0,
            origin_clean: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn global_alpha(&self) -> f32 {
        self.global_alpha
    }

    /// Set the alpha applied to every subsequent draw. Values are clamped to
    /// `[0, 1]`; non-finite values reset to fully opaque.
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
    }

    /// False once any cross-origin pixels without permission were drawn
    pub fn is_origin_clean(&self) -> bool {
        self.origin_clean
    }

    /// Draw `image` scaled into `dest`, blending source-over with the current
    /// global alpha. Parts of `dest` outside the surface are clipped.
    pub fn draw_image(&mut self, image: &RgbaImage, origin_clean: bool, dest: DrawRect) {
        if !origin_clean {
            self.origin_clean = false;
        }

        let w = dest.width.round();
        let h = dest.height.round();
        if !(w >= 1.0 && h >= 1.0) {
            return;
        }
        let (w, h) = (w as u32, h as u32);

        let scaled;
        let src = if image.dimensions() == (w, h) {
            image
        } else {
            scaled = imageops::resize(image, w, h, FilterType::Triangle);
            &scaled
        };

        let ox = dest.x.round() as i64;
        let oy = dest.y.round() as i64;
        let (sw, sh) = (i64::from(self.width()), i64::from(self.height()));
        let alpha = self.global_alpha;

        for (sx, sy, px) in src.enumerate_pixels() {
            let tx = ox + i64::from(sx);
            let ty = oy + i64::from(sy);
            if tx < 0 || ty < 0 || tx >= sw || ty >= sh {
                continue;
            }
            let dst = self.pixels.get_pixel_mut(tx as u32, ty as u32);
            *dst = blend_over(*dst, *px, alpha);
        }
    }

    /// Read back a region of pixels.
    ///
    /// Fails with [`Error::SecurityError`] when the surface is tainted, and with
    /// [`Error::Other`] when the region is empty or out of bounds.
    pub fn read_pixels(&self, x: u32, y: u32, width: u32, height: u32) -> Result<RgbaImage> {
        if !self.origin_clean {
            return Err(Error::SecurityError(
                "the surface has been tainted by cross-origin data".into(),
            ));
        }
        let fits = width > 0
            && height > 0
            && x.checked_add(width).is_some_and(|r| r <= self.width())
            && y.checked_add(height).is_some_and(|b| b <= self.height());
        if !fits {
            return Err(Error::Other(format!(
                "pixel region {}x{} at ({}, {}) is outside the {}x{} surface",
                width,
                height,
                x,
                y,
                self.width(),
                self.height()
            )));
        }
        Ok(imageops::crop_imm(&self.pixels, x, y, width, height).to_image())
    }

    pub(crate) fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

// Straight-alpha source-over.
fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, global_alpha: f32) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0 * global_alpha;
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = f32::from(src[c]);
        let d = f32::from(dst[c]);
        out[c] = ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Decode a raster artifact into RGBA pixels
pub fn decode_artifact(artifact: &ImageArtifact) -> Result<RgbaImage> {
    let codec = match artifact.format() {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Svg => {
            return Err(Error::DecodeError(
                "source decode error: vector artifacts cannot be decoded into a bitmap".into(),
            ))
        }
    };
    image::load_from_memory_with_format(artifact.bytes(), codec)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::DecodeError(format!("source decode error: {}", e)))
}

/// Turns a surface back into an encoded artifact.
pub trait SurfaceEncoder: Send + Sync {
    fn encode(&self, surface: &Surface, format: ImageFormat, quality: f32) -> Result<ImageArtifact>;
}

/// PNG/JPEG encoder backed by the `image` codecs
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterEncoder;

impl SurfaceEncoder for RasterEncoder {
    fn encode(&self, surface: &Surface, format: ImageFormat, quality: f32) -> Result<ImageArtifact> {
        if !surface.is_origin_clean() {
            return Err(Error::SecurityError("tainted surfaces may not be exported".into()));
        }
        encode_rgba(surface.pixels(), format, quality)
    }
}

pub(crate) fn encode_rgba(pixels: &RgbaImage, format: ImageFormat, quality: f32) -> Result<ImageArtifact> {
    let (w, h) = pixels.dimensions();
    let mut buf = Vec::new();
    match format {
        ImageFormat::Png => PngEncoder::new(&mut buf)
            .write_image(pixels.as_raw(), w, h, ExtendedColorType::Rgba8)
            .map_err(|e| Error::EncodeError(e.to_string()))?,
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality))
                .write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| Error::EncodeError(e.to_string()))?
        }
        ImageFormat::Svg => {
            return Err(Error::EncodeError(
                "vector output cannot be produced from a raster surface".into(),
            ))
        }
    }
    Ok(ImageArtifact::new(format, buf))
}

/// Map a `[0, 1]` quality onto the codec's `1..=100` scale
pub(crate) fn jpeg_quality(quality: f32) -> u8 {
    if !quality.is_finite() {
        return DEFAULT_JPEG_QUALITY;
    }
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}
