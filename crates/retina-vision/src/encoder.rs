//! ONNX inference for the CLIP vision tower using ORT (ONNX Runtime).

use std::path::Path;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use ort::inputs;
use ort::session::{builder::SessionBuilder, Session};
use ort::value::Value;
use thiserror::Error;

use crate::models::{ModelError, ModelManager};
use crate::preprocess::{self, CLIP_INPUT_SIZE};
use crate::EMBEDDING_DIM;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("unexpected embedding length: expected {expected}, got {actual}")]
    UnexpectedOutput { expected: usize, actual: usize },
    #[error("Other error: {0}")]
    Other(String),
}

/// CLIP image encoder.
///
/// Maps a decoded RGB image to a 512-dimensional L2-normalized embedding.
/// Inference is CPU-bound and synchronous; callers on async runtimes run it
/// under `spawn_blocking`.
#[derive(Clone, Debug)]
pub struct ClipEncoder {
    session: Arc<Mutex<Session>>,
}

impl ClipEncoder {
    /// Create an encoder from pre-staged local model files.
    ///
    /// Intentionally offline-only. Use `setup_models()` first.
    pub fn new(model_dir: &Path) -> Result<Self, EncoderError> {
        let manager = ModelManager::from_dir(model_dir.to_path_buf());
        let model_path = manager.get_vision_model_offline()?;

        // Initialize the global ORT environment; a second init is a no-op.
        let _ = ort::init().with_name("retina").commit();

        // intra_threads=1 avoids oversubscription next to the server runtime.
        let session = SessionBuilder::new()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Download and stage the model artifacts in `model_dir`.
    pub fn setup_models(model_dir: &Path) -> Result<(), EncoderError> {
        let manager = ModelManager::from_dir(model_dir.to_path_buf());
        manager.setup_models()?;
        Ok(())
    }

    /// Embed an RGB image into a unit-length 512-dimensional vector.
    pub fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, EncoderError> {
        let pixel_values = preprocess::clip_pixel_values(image);
        let size = CLIP_INPUT_SIZE as usize;
        let input_shape = vec![1usize, 3, size, size];
        let input_value = Value::from_array((input_shape, pixel_values))?;

        let session = self.session.clone();
        // Panic safety: a model crash (e.g. shape mismatch) must surface as
        // an error, not take the calling thread down.
        let embedding = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut session = session.lock().unwrap();
            let outputs = session.run(inputs![input_value])?;
            let embedding_tensor = outputs[0].try_extract_tensor::<f32>()?;
            Ok::<Vec<f32>, EncoderError>(embedding_tensor.1.to_vec())
        }))
        .map_err(|_| EncoderError::Other("Inference panicked".to_string()))??;

        if embedding.len() != EMBEDDING_DIM {
            return Err(EncoderError::UnexpectedOutput {
                expected: EMBEDDING_DIM,
                actual: embedding.len(),
            });
        }

        Ok(normalize(&embedding))
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vectors() {
        let v = normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vectors_alone() {
        let v = normalize(&[0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn construction_fails_without_staged_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClipEncoder::new(dir.path()).unwrap_err();
        assert!(matches!(err, EncoderError::Model(ModelError::ManifestMissing(_))));
    }
}
