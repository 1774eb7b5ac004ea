//! Slide image loading with bounded waits and a fallback policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use keepsake_common::cancel::CancelToken;
use keepsake_common::config::ImageFallbackPolicy;
use keepsake_common::error::KeepsakeError;
use keepsake_slide_model::{is_remote_source, Slide};

/// Why a slide image could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageLoadError {
    #[error("Timed out after {timeout:?} loading {location}")]
    Timeout { location: String, timeout: Duration },

    #[error("Failed to fetch {location}: {message}")]
    Fetch { location: String, message: String },

    #[error("Failed to decode {location}: {message}")]
    Decode { location: String, message: String },

    #[error("Image load cancelled")]
    Cancelled,
}

impl From<ImageLoadError> for KeepsakeError {
    fn from(err: ImageLoadError) -> Self {
        match err {
            ImageLoadError::Cancelled => KeepsakeError::Cancelled,
            other => KeepsakeError::image_load(other.to_string()),
        }
    }
}

/// Retrieves the encoded bytes of an image source.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageLoadError>;
}

/// Fetches `http(s)://` sources with reqwest and everything else from disk.
#[derive(Debug, Clone, Default)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageFetcher for SourceFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageLoadError> {
        let fetch_err = |message: String| ImageLoadError::Fetch {
            location: location.to_string(),
            message,
        };

        if is_remote_source(location) {
            let response = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| fetch_err(e.to_string()))?;
            if !response.status().is_success() {
                return Err(fetch_err(format!("HTTP {}", response.status())));
            }
            let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|e| fetch_err(e.to_string()))
        }
    }
}

/// Outcome of resolving one slide's image under the fallback policy.
#[derive(Debug, Clone)]
pub enum SlideImage {
    Loaded(RgbaImage),
    /// The load failed and a generated image stands in.
    Placeholder(RgbaImage),
    /// The load failed and the slide is dropped.
    Skipped,
}

impl SlideImage {
    pub fn image(&self) -> Option<&RgbaImage> {
        match self {
            SlideImage::Loaded(image) | SlideImage::Placeholder(image) => Some(image),
            SlideImage::Skipped => None,
        }
    }
}

/// Loads and decodes slide images, each bounded by a timeout.
#[derive(Clone)]
pub struct ImageLoader {
    fetcher: Arc<dyn ImageFetcher>,
    timeout: Duration,
    fallback: ImageFallbackPolicy,
    placeholder_size: (u32, u32),
}

impl ImageLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            fallback: ImageFallbackPolicy::Placeholder,
            placeholder_size: (
                keepsake_slide_model::OUTPUT_WIDTH,
                keepsake_slide_model::OUTPUT_HEIGHT,
            ),
        }
    }

    pub fn with_fallback(mut self, fallback: ImageFallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> ImageFallbackPolicy {
        self.fallback
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and decode `location`, giving up after the timeout or on
    /// cancellation.
    pub async fn load(
        &self,
        location: &str,
        cancel: &CancelToken,
    ) -> Result<RgbaImage, ImageLoadError> {
        if cancel.is_cancelled() {
            return Err(ImageLoadError::Cancelled);
        }

        let work = async {
            let bytes = self.fetcher.fetch(location).await?;
            decode(location, bytes).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ImageLoadError::Cancelled),
            result = tokio::time::timeout(self.timeout, work) => match result {
                Ok(decoded) => decoded,
                Err(_) => Err(ImageLoadError::Timeout {
                    location: location.to_string(),
                    timeout: self.timeout,
                }),
            },
        }
    }

    /// Load the image of slide `index`, applying the fallback policy on
    /// failure. Only cancellation is returned as an error.
    pub async fn resolve(
        &self,
        index: usize,
        slide: &Slide,
        cancel: &CancelToken,
    ) -> Result<SlideImage, ImageLoadError> {
        match self.load(&slide.image_source, cancel).await {
            Ok(image) => {
                tracing::debug!(
                    slide = index,
                    width = image.width(),
                    height = image.height(),
                    "Slide image loaded"
                );
                Ok(SlideImage::Loaded(image))
            }
            Err(ImageLoadError::Cancelled) => Err(ImageLoadError::Cancelled),
            Err(err) => {
                tracing::warn!(
                    slide = index,
                    error = %err,
                    policy = ?self.fallback,
                    "Slide image unavailable"
                );
                Ok(match self.fallback {
                    ImageFallbackPolicy::Placeholder => {
                        let (w, h) = self.placeholder_size;
                        SlideImage::Placeholder(placeholder_image(w, h))
                    }
                    ImageFallbackPolicy::Skip => SlideImage::Skipped,
                })
            }
        }
    }
}

async fn decode(location: &str, bytes: Vec<u8>) -> Result<RgbaImage, ImageLoadError> {
    let decode_err = |message: String| ImageLoadError::Decode {
        location: location.to_string(),
        message,
    };
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|img| img.to_rgba8()))
        .await
        .map_err(|e| decode_err(e.to_string()))?
        .map_err(|e| decode_err(e.to_string()))
}

/// Vertical pink-to-indigo gradient used in place of a missing photo.
pub fn placeholder_image(width: u32, height: u32) -> RgbaImage {
    let top = [0xec as f64, 0x48 as f64, 0x99 as f64];
    let bottom = [0x31 as f64, 0x2e as f64, 0x81 as f64];
    let span = height.saturating_sub(1).max(1) as f64;
    RgbaImage::from_fn(width, height, |_, y| {
        let t = y as f64 / span;
        let mix = |c: usize| (top[c] + (bottom[c] - top[c]) * t).round() as u8;
        Rgba([mix(0), mix(1), mix(2), 255])
    })
}
