//! HTTP image fetcher with browser-style CORS semantics.
//!
//! Anonymous cross-origin requests carry an `Origin` header and only succeed
//! when the response allows that origin. Requests without a CORS annotation
//! always succeed but yield pixels that are not origin-clean.

use crate::loader::{CorsMode, FetchedImage, ImageFetcher};
use crate::{Error, ExportConfig, Result};
use async_trait::async_trait;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, USER_AGENT};
use reqwest::Client;
use url::Url;

/// `reqwest`-backed [`ImageFetcher`]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    page_origin: Option<Url>,
    enforce_cors: bool,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        let page_origin = match config.page_origin.as_deref() {
            Some(o) => Some(
                Url::parse(o)
                    .map_err(|e| Error::ConfigError(format!("Invalid page origin {}: {}", o, e)))?,
            ),
            None => None,
        };

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            page_origin,
            enforce_cors: config.enforce_cors,
            max_body_bytes: config.max_image_bytes,
        })
    }

    /// Serialized origin sent in the `Origin` header (`null` when opaque)
    fn origin_header(&self) -> String {
        self.page_origin
            .as_ref()
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|| "null".to_string())
    }

    fn is_same_origin(&self, target: &Url) -> bool {
        match &self.page_origin {
            // Opaque origins never match, including file:// pages
            Some(page) => page.origin().is_tuple() && page.origin() == target.origin(),
            None => false,
        }
    }

    /// Read the whole body, refusing anything larger than the configured cap
    async fn read_body(&self, url: &str, mut resp: reqwest::Response) -> Result<Vec<u8>> {
        let limit = self.max_body_bytes;
        if let Some(declared) = resp.content_length().filter(|len| *len > limit) {
            return Err(body_too_large(url, declared, limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))?
        {
            let received = body.len() as u64 + chunk.len() as u64;
            if received > limit {
                return Err(body_too_large(url, received, limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn body_too_large(url: &str, size: u64, limit: u64) -> Error {
    Error::LoadError(format!(
        "{} response of {} bytes exceeds the {} byte limit",
        url, size, limit
    ))
}

/// Whether an `Access-Control-Allow-Origin` value admits `origin`
pub(crate) fn cors_allows(allow_origin: Option<&str>, origin: &str) -> bool {
    match allow_origin.map(str::trim) {
        Some("*") => true,
        Some(value) => value == origin,
        None => false,
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch_image(&self, url: &str, mode: CorsMode) -> Result<FetchedImage> {
        let target = Url::parse(url)
            .map_err(|e| Error::LoadError(format!("Invalid image URL {}: {}", url, e)))?;
        let same_origin = self.is_same_origin(&target);
        let origin = self.origin_header();

        let mut request = self.client.get(target.clone()).header(USER_AGENT, &self.user_agent);
        if mode == CorsMode::Anonymous && !same_origin {
            request = request.header(ORIGIN, &origin);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::NetworkError(format!("Failed to fetch {}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(Error::LoadError(format!("{} returned HTTP {}", url, resp.status())));
        }

        let cors_clean = if same_origin {
            true
        } else {
            match mode {
                CorsMode::Anonymous => {
                    let allow = resp
                        .headers()
                        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                        .and_then(|v| v.to_str().ok());
                    if self.enforce_cors && !cors_allows(allow, &origin) {
                        return Err(Error::LoadError(format!(
                            "Cross-origin request to {} blocked: origin {} is not allowed",
                            url, origin
                        )));
                    }
                    true
                }
                CorsMode::NoCors => false,
            }
        };

        let body = self.read_body(url, resp).await?;
        let image = image::load_from_memory(&body)
            .map_err(|e| Error::DecodeError(format!("{} is not a supported image: {}", url, e)))?;

        Ok(FetchedImage { image, cors_clean })
    }
}
