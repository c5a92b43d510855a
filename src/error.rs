//! Error types for the conversion pipeline

use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Remediation hints shared by the load and taint failures.
const CROSS_ORIGIN_SUGGESTIONS: &str = "Suggestions:
• Use an image from a CORS-enabled server (like imgur.com, github.com, or your own server)
• Host the watermark image locally and serve it from the same domain
• Use a different image URL that supports cross-origin requests";

/// Errors that can occur while converting markup to an image
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input or configuration (empty content, bad watermark URL)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The rendering engine produced no usable artifact
    #[error("Failed to convert to {format}: {reason}")]
    RenderError { format: String, reason: String },

    /// A single image load attempt failed
    #[error("Failed to load image: {0}")]
    LoadError(String),

    /// Every loader strategy failed for a watermark URL
    #[error(
        "Failed to load watermark image from {url}. This could be due to:
• CORS restrictions (the server doesn't allow cross-origin requests)
• Invalid or broken image URL
• Network connectivity issues

{suggestions}

Last error: {last_error}",
        suggestions = CROSS_ORIGIN_SUGGESTIONS
    )]
    WatermarkLoadError { url: String, last_error: String },

    /// The composed surface became unreadable because of cross-origin data
    #[error(
        "Export blocked by cross-origin security policy: the watermark image from \"{url}\" cannot be exported.

{suggestions}
• Disable the watermark for this conversion",
        suggestions = CROSS_ORIGIN_SUGGESTIONS
    )]
    TaintError { url: String },

    /// Failed to encode a surface into an artifact
    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    /// Failed to decode an artifact or fetched payload into pixels
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    /// Pixel read-back refused on a tainted surface
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Filesystem or stream error while delivering an artifact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error prevents any image from being delivered.
    ///
    /// Only configuration and render failures block an export; everything on
    /// the watermark path degrades to a warning with a fallback artifact.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Error::ConfigError(_) | Error::RenderError { .. })
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => Error::EncodeError(e.to_string()),
            other => Error::DecodeError(other.to_string()),
        }
    }
}
