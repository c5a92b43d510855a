//! Remote image loading with an ordered ladder of fallback strategies.
//!
//! Strategies run strictly one after another until one yields an image:
//!
//! 1. anonymous cross-origin fetch
//! 2. the same with a cache-busting query parameter
//! 3. one attempt per configured CORS relay
//! 4. a fetch without any cross-origin annotation, which always taints
//!
//! Each attempt is bounded by its own timeout. When the hosting page is a
//! local `file://` page only the two direct attempts are made.

use crate::{Error, ExportConfig, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use log::{debug, warn};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Public CORS relays used when no endpoints are configured explicitly.
pub const DEFAULT_PROXY_ENDPOINTS: [&str; 2] = [
    "https://cors-anywhere.herokuapp.com/{url}",
    "https://api.allorigins.win/raw?url={encoded_url}",
];

/// Cross-origin annotation of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsMode {
    /// `crossorigin="anonymous"`: the server must allow our origin
    Anonymous,
    /// No annotation: always loads, but cross-origin pixels are unreadable
    NoCors,
}

/// A decoded image as returned by a fetcher
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub image: DynamicImage,
    /// Whether pixels may be read back after drawing this image
    pub cors_clean: bool,
}

/// Remote fetch primitive used by the loader.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str, mode: CorsMode) -> Result<FetchedImage>;
}

/// Where a strategy points its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategySource {
    Direct,
    CacheBusted,
    /// Relay template containing `{url}` or `{encoded_url}`
    Proxy(String),
}

/// One rung of the fallback ladder.
#[derive(Debug, Clone)]
pub struct LoadStrategy {
    pub name: String,
    pub source: StrategySource,
    pub mode: CorsMode,
    pub timeout: Duration,
    /// Success of this strategy implies a tainted surface
    pub taints: bool,
}

impl LoadStrategy {
    /// The URL actually requested for `url`
    pub fn target_url(&self, url: &str) -> String {
        match &self.source {
            StrategySource::Direct => url.to_string(),
            StrategySource::CacheBusted => cache_busted_url(url, unix_millis()),
            StrategySource::Proxy(template) => proxied_url(template, url),
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self.source, StrategySource::Proxy(_))
    }
}

/// Build the default ladder from the configured timeouts and relays
pub fn default_strategies(config: &ExportConfig) -> Vec<LoadStrategy> {
    let direct = Duration::from_millis(config.direct_timeout_ms);
    let proxied = Duration::from_millis(config.proxy_timeout_ms);

    let mut strategies = vec![
        LoadStrategy {
            name: "anonymous".into(),
            source: StrategySource::Direct,
            mode: CorsMode::Anonymous,
            timeout: direct,
            taints: false,
        },
        LoadStrategy {
            name: "anonymous, cache-busted".into(),
            source: StrategySource::CacheBusted,
            mode: CorsMode::Anonymous,
            timeout: direct,
            taints: false,
        },
    ];
    for (i, template) in config.proxy_endpoints.iter().enumerate() {
        strategies.push(LoadStrategy {
            name: format!("proxy #{}", i + 1),
            source: StrategySource::Proxy(template.clone()),
            mode: CorsMode::Anonymous,
            timeout: proxied,
            taints: false,
        });
    }
    strategies.push(LoadStrategy {
        name: "no-cors".into(),
        source: StrategySource::Direct,
        mode: CorsMode::NoCors,
        timeout: direct,
        taints: true,
    });
    strategies
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

pub(crate) fn cache_busted_url(url: &str, stamp: u128) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair("t", &stamp.to_string());
            parsed.to_string()
        }
        Err(_) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}t={}", url, sep, stamp)
        }
    }
}

pub(crate) fn proxied_url(template: &str, url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    template.replace("{encoded_url}", &encoded).replace("{url}", url)
}

/// A successfully loaded watermark image
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: RgbaImage,
    /// The URL the caller asked for (not the relay URL)
    pub source_url: String,
    /// Name of the strategy that succeeded
    pub strategy: String,
    /// Drawing this image poisons the target surface
    pub tainted: bool,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Runs the strategy ladder against an [`ImageFetcher`].
pub struct ImageLoader<F> {
    fetcher: F,
    strategies: Vec<LoadStrategy>,
    local: bool,
}

impl<F: ImageFetcher> ImageLoader<F> {
    pub fn new(fetcher: F, config: &ExportConfig) -> Self {
        Self {
            fetcher,
            strategies: default_strategies(config),
            local: config.is_local_origin(),
        }
    }

    /// Use a custom ladder. `local` limits loading to the first two attempts.
    pub fn with_strategies(fetcher: F, strategies: Vec<LoadStrategy>, local: bool) -> Self {
        Self { fetcher, strategies, local }
    }

    pub fn strategies(&self) -> &[LoadStrategy] {
        &self.strategies
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Load `url`, trying each strategy in order until one succeeds.
    pub async fn load(&self, url: &str) -> Result<LoadedImage> {
        let mut last_error: Option<Error> = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            let target = strategy.target_url(url);
            debug!("Trying watermark loading strategy {} ({})", index + 1, strategy.name);

            let attempt = tokio::time::timeout(
                strategy.timeout,
                self.fetcher.fetch_image(&target, strategy.mode),
            )
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(strategy.timeout.as_millis() as u64)));

            match attempt {
                Ok(fetched) => {
                    let tainted = strategy.taints || !fetched.cors_clean;
                    if tainted {
                        warn!("Watermark image from {} will taint the surface", url);
                    }
                    debug!("Strategy {} succeeded", index + 1);
                    return Ok(LoadedImage {
                        image: fetched.image.to_rgba8(),
                        source_url: url.to_string(),
                        strategy: strategy.name.clone(),
                        tainted,
                    });
                }
                Err(e) => {
                    debug!("Strategy {} failed: {}", index + 1, e);
                    last_error = Some(e);
                    // Relays and the no-cors fallback need an HTTP page context
                    if self.local && index >= 1 {
                        debug!("Local page: skipping remaining strategies");
                        break;
                    }
                }
            }
        }

        Err(Error::WatermarkLoadError {
            url: url.to_string(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&str, CorsMode) -> Result<FetchedImage> + Send + Sync>;

    /// Fetcher with scripted responses that records every request
    pub(crate) struct ScriptedFetcher {
        pub calls: Mutex<Vec<(String, CorsMode)>>,
        respond: Responder,
    }

    impl ScriptedFetcher {
        pub fn new(respond: impl Fn(&str, CorsMode) -> Result<FetchedImage> + Send + Sync + 'static) -> Self {
            Self { calls: Mutex::new(Vec::new()), respond: Box::new(respond) }
        }

        pub fn failing() -> Self {
            Self::new(|url, _| Err(Error::NetworkError(format!("connection refused: {}", url))))
        }

        /// Serves a solid image for every request; no-cors loads are not clean
        pub fn serving(width: u32, height: u32, rgba: [u8; 4]) -> Self {
            Self::new(move |_, mode| Ok(solid_image(width, height, rgba, mode == CorsMode::Anonymous)))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageFetcher for ScriptedFetcher {
        async fn fetch_image(&self, url: &str, mode: CorsMode) -> Result<FetchedImage> {
            self.calls.lock().unwrap().push((url.to_string(), mode));
            (self.respond)(url, mode)
        }
    }

    pub(crate) fn solid_image(width: u32, height: u32, rgba: [u8; 4], cors_clean: bool) -> FetchedImage {
        FetchedImage {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(rgba))),
            cors_clean,
        }
    }

    /// Test configuration with no settle delays and the default ladder
    pub(crate) fn quick_config() -> ExportConfig {
        ExportConfig {
            settle_delay_ms: 0,
            resize_settle_delay_ms: 0,
            ..Default::default()
        }
    }
}
