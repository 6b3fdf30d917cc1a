//! The embedding capability consumed by the search and rebuild paths.
//!
//! The model itself is an opaque function "image in, unit vector out"; this
//! seam keeps index and rebuild logic testable without the real weights.

use anyhow::Result;
use image::RgbImage;
use retina_vision::ClipEncoder;

pub trait ImageEmbedder: Send + Sync {
    /// Embedding dimensionality this embedder produces.
    fn dim(&self) -> usize;

    /// Encode an image into an L2-normalized feature vector.
    ///
    /// CPU-bound; async callers run this under `spawn_blocking`.
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>>;
}

impl ImageEmbedder for ClipEncoder {
    fn dim(&self) -> usize {
        retina_vision::EMBEDDING_DIM
    }

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        Ok(self.embed_image(image)?)
    }
}
