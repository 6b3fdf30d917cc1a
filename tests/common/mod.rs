//! Shared fixtures: in-memory catalog, stub image source, stub embedder.
//!
//! The stub pipeline encodes a product id into the red channel of a 1x1
//! image and maps it back to a basis vector, so similarity outcomes are
//! exact and deterministic without the real model.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use axum::body::Body;
use axum::http::Request;
use image::{DynamicImage, Rgb, RgbImage};

use retina::catalog::{CatalogStore, ProductRecord};
use retina::embedder::ImageEmbedder;
use retina::fetch::ImageSource;
use retina::manager::IndexManager;
use retina::server::AppState;

pub const DIM: usize = 8;
pub const BOUNDARY: &str = "retina-test-boundary";

pub struct MemoryCatalog {
    products: Mutex<Vec<ProductRecord>>,
}

impl MemoryCatalog {
    pub fn new(ids: &[i64]) -> Self {
        Self {
            products: Mutex::new(ids.iter().map(|&id| product(id)).collect()),
        }
    }

    pub fn set(&self, ids: &[i64]) {
        *self.products.lock().unwrap() = ids.iter().map(|&id| product(id)).collect();
    }
}

fn product(id: i64) -> ProductRecord {
    ProductRecord {
        id,
        name: format!("product-{id}"),
        image_url: format!("http://images.test/{id}.png"),
    }
}

impl CatalogStore for MemoryCatalog {
    fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.products.lock().unwrap().clone())
    }
}

/// Serves a 1x1 image whose red channel encodes the product id from the
/// URL; listed ids fail instead. An optional delay keeps a rebuild in
/// flight long enough to race requests against it.
pub struct StubImageSource {
    failing: Mutex<HashSet<i64>>,
    delay: Option<std::time::Duration>,
}

impl StubImageSource {
    pub fn new(failing: &[i64]) -> Self {
        Self {
            failing: Mutex::new(failing.iter().copied().collect()),
            delay: None,
        }
    }

    pub fn slow(failing: &[i64], delay: std::time::Duration) -> Self {
        Self {
            failing: Mutex::new(failing.iter().copied().collect()),
            delay: Some(delay),
        }
    }

    pub fn fail_all(&self, ids: &[i64]) {
        *self.failing.lock().unwrap() = ids.iter().copied().collect();
    }
}

impl ImageSource for StubImageSource {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let id: i64 = url
            .rsplit('/')
            .next()
            .and_then(|f| f.strip_suffix(".png"))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("bad test url {url}"))?;
        if self.failing.lock().unwrap().contains(&id) {
            return Err(anyhow!("connection timed out fetching {url}"));
        }
        Ok(RgbImage::from_pixel(1, 1, Rgb([id as u8, 0, 0])))
    }
}

/// Maps the first pixel's red channel to a basis vector.
pub struct StubEmbedder {
    pub dim: usize,
}

impl ImageEmbedder for StubEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let channel = image.get_pixel(0, 0).0[0] as usize % self.dim;
        let mut v = vec![0.0; self.dim];
        v[channel] = 1.0;
        Ok(v)
    }
}

pub struct Fixture {
    pub manager: Arc<IndexManager>,
    pub catalog: Arc<MemoryCatalog>,
    pub images: Arc<StubImageSource>,
    pub index_dir: tempfile::TempDir,
}

pub fn fixture(ids: &[i64], failing: &[i64]) -> Fixture {
    fixture_with_source(ids, StubImageSource::new(failing))
}

pub fn fixture_with_source(ids: &[i64], source: StubImageSource) -> Fixture {
    let index_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MemoryCatalog::new(ids));
    let images = Arc::new(source);
    let manager = Arc::new(IndexManager::new(
        DIM,
        index_dir.path().to_path_buf(),
        catalog.clone(),
        images.clone(),
        Arc::new(StubEmbedder { dim: DIM }),
    ));
    Fixture {
        manager,
        catalog,
        images,
        index_dir,
    }
}

pub fn app_state(manager: Arc<IndexManager>, top_k: usize) -> Arc<AppState> {
    Arc::new(AppState {
        embedder: manager.embedder(),
        manager,
        top_k,
        model_name: "stub-encoder".to_string(),
        allowed_origins: vec!["*".to_string()],
    })
}

/// PNG bytes of a 1x1 image whose red channel is `channel`.
pub fn query_png(channel: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(1, 1, Rgb([channel, 0, 0]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn multipart_body(field: &str, content_type: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"query.png\"\r\n")
            .as_bytes(),
    );
    if let Some(ct) = content_type {
        body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn search_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/search/visual")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
