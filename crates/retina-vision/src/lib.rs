//! Retina vision: CLIP image embeddings over ONNX Runtime.
//!
//! Wraps the CLIP ViT-B/32 vision tower behind a small, synchronous API:
//! decode and preprocess an image, run the session, L2-normalize the output.
//! Model artifacts are staged once by [`models::ModelManager`] and verified
//! against a local checksum manifest on every subsequent load.

pub mod encoder;
pub mod models;
pub mod preprocess;

pub use encoder::{ClipEncoder, EncoderError};
pub use models::{ModelError, ModelManager};

/// Embedding dimensionality of the CLIP ViT-B/32 image tower.
pub const EMBEDDING_DIM: usize = 512;

/// Human-readable model identifier, reported by the service banner.
pub const MODEL_NAME: &str = "clip-ViT-B-32";
