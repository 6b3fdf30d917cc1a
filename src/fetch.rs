//! Catalog image acquisition.

use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use retina_vision::preprocess;

pub trait ImageSource: Send + Sync {
    /// Download and decode one catalog image.
    fn fetch(&self, url: &str) -> Result<RgbImage>;
}

/// HTTP image source with a bounded per-request timeout.
///
/// One unreachable image host must never stall a rebuild, so every request
/// carries the configured timeout; redirects are followed up to a small
/// limit and non-2xx responses are failures. The client is blocking: the
/// rebuild pipeline runs on a blocking thread.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("building image fetch client")?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("fetching {url}"))?;

        let bytes = response
            .bytes()
            .with_context(|| format!("reading body of {url}"))?;

        let image = preprocess::decode_rgb(&bytes)
            .with_context(|| format!("decoding image from {url}"))?;
        Ok(image)
    }
}
