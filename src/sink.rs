//! Delivery sinks for finished artifacts: files and clipboard-style streams.

use crate::artifact::ImageArtifact;
use crate::{Error, Result};
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Somewhere an artifact can be delivered to
pub trait ArtifactSink {
    fn deliver(&self, artifact: &ImageArtifact) -> Result<()>;
}

/// Persists the artifact's bytes to a file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Save into `dir` under the artifact's default filename
    pub fn in_dir(dir: impl AsRef<Path>, artifact: &ImageArtifact) -> Self {
        Self::new(dir.as_ref().join(artifact.default_filename()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSink for FileSink {
    fn deliver(&self, artifact: &ImageArtifact) -> Result<()> {
        std::fs::write(&self.path, artifact.bytes())?;
        info!("Saved {} bytes to {}", artifact.len(), self.path.display());
        Ok(())
    }
}

/// What gets placed on a clipboard for an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    /// Vector documents are copied as their source text
    Text(String),
    /// Raster images are copied as binary data with their MIME type
    Image { mime: &'static str, bytes: Vec<u8> },
}

impl ClipboardPayload {
    pub fn from_artifact(artifact: &ImageArtifact) -> Result<Self> {
        if artifact.format().is_vector() {
            let text = String::from_utf8(artifact.bytes().to_vec())
                .map_err(|e| Error::Other(format!("Vector artifact is not UTF-8: {}", e)))?;
            Ok(ClipboardPayload::Text(text))
        } else {
            Ok(ClipboardPayload::Image {
                mime: artifact.mime_type(),
                bytes: artifact.bytes().to_vec(),
            })
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ClipboardPayload::Text(text) => text.as_bytes(),
            ClipboardPayload::Image { bytes, .. } => bytes,
        }
    }
}

/// Writes the clipboard payload to a stream, e.g. stdout piped into
/// `xclip -selection clipboard -t image/png`
pub struct StreamSink<W> {
    writer: Mutex<W>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StreamSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ArtifactSink for StreamSink<W> {
    fn deliver(&self, artifact: &ImageArtifact) -> Result<()> {
        let payload = ClipboardPayload::from_artifact(artifact)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Other("output stream lock poisoned".into()))?;
        writer.write_all(payload.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}
