//! Encoded image artifacts and their data-URI form.

use crate::{Error, Result};
use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Output format requested for a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Svg,
}

/// Broad family of an output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    LosslessRaster,
    LossyRaster,
    Vector,
}

impl ImageFormat {
    pub fn family(self) -> FormatFamily {
        match self {
            ImageFormat::Png => FormatFamily::LosslessRaster,
            ImageFormat::Jpeg => FormatFamily::LossyRaster,
            ImageFormat::Svg => FormatFamily::Vector,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Svg => "svg",
        }
    }

    /// Upper-case name used in user-facing messages
    pub fn label(self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Svg => "SVG",
        }
    }

    pub fn is_vector(self) -> bool {
        self.family() == FormatFamily::Vector
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/svg+xml" => Some(ImageFormat::Svg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(Error::ConfigError(format!("Unsupported format: {}", other))),
        }
    }
}

/// An encoded image with an explicit format.
///
/// Artifacts are immutable once produced; the compositor hands back the
/// very same bytes when it has to fall back to an unwatermarked result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    format: ImageFormat,
    bytes: Vec<u8>,
}

impl ImageArtifact {
    pub fn new(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    /// Parse a `data:<mime>[;param];base64,<payload>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| Error::DecodeError("not a data URI".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::DecodeError("data URI has no payload".into()))?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default();
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(Error::DecodeError("data URI is not base64 encoded".into()));
        }
        let format = ImageFormat::from_mime(mime)
            .ok_or_else(|| Error::DecodeError(format!("unsupported media type: {}", mime)))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::DecodeError(format!("invalid base64 payload: {}", e)))?;
        Ok(Self { format, bytes })
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex-encoded SHA-256 of the encoded bytes
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// `converted-image.<ext>`, the name used when saving without an explicit path
    pub fn default_filename(&self) -> String {
        format!("converted-image.{}", self.format.extension())
    }
}
