use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const VISION_MODEL_URL: &str =
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx";
const MANIFEST_FILE: &str = "model-manifest.json";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Required model file missing: {0}")]
    ModelMissing(PathBuf),
    #[error("Model manifest missing: {0}")]
    ManifestMissing(PathBuf),
    #[error("Model manifest invalid at {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelManifest {
    version: u32,
    vision_sha256: String,
}

/// Stages and verifies the CLIP vision ONNX artifact.
///
/// Hashes are captured into a local manifest on first download (trust on
/// first use) and strictly enforced on every subsequent load.
pub struct ModelManager {
    root: PathBuf,
}

impl ModelManager {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        fs::create_dir_all(&root).ok();
        Self { root }
    }

    pub fn new() -> Self {
        // Env override first (air-gap support), XDG cache otherwise.
        if let Ok(p) = std::env::var("RETINA_MODEL_DIR") {
            return Self::from_dir(PathBuf::from(p));
        }

        if let Some(dirs) = ProjectDirs::from("com", "retina", "retina") {
            Self::from_dir(dirs.cache_dir().join("models"))
        } else {
            Self::from_dir(PathBuf::from(".retina/models"))
        }
    }

    #[inline]
    fn vision_model_path(&self) -> PathBuf {
        self.root.join("clip_vision.onnx")
    }

    #[inline]
    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn load_manifest(&self) -> Result<ModelManifest, ModelError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(ModelError::ManifestMissing(path));
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| ModelError::ManifestInvalid {
            path,
            reason: e.to_string(),
        })
    }

    fn write_manifest(&self, manifest: &ModelManifest) -> Result<(), ModelError> {
        let path = self.manifest_path();
        let tmp_path = self.root.join(format!("{}.tmp", MANIFEST_FILE));
        let payload =
            serde_json::to_vec_pretty(manifest).map_err(|e| ModelError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        sync_parent_dir(&path)?;
        Ok(())
    }

    fn verify_expected_hash(&self, path: &Path, expected: &str) -> Result<(), ModelError> {
        let actual = compute_sha256(path)?;
        if actual == expected {
            Ok(())
        } else {
            Err(ModelError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            })
        }
    }

    fn ensure_verified(&self, path: PathBuf, expected: &str) -> Result<PathBuf, ModelError> {
        if !path.exists() {
            return Err(ModelError::ModelMissing(path));
        }
        self.verify_expected_hash(&path, expected)?;
        Ok(path)
    }

    /// Ensure the vision model exists and is verified, downloading if needed.
    pub fn get_vision_model(&self) -> Result<PathBuf, ModelError> {
        let path = self.vision_model_path();
        let manifest = self.load_manifest()?;
        if !path.exists() {
            self.download_file(VISION_MODEL_URL, &path)?;
        }
        self.ensure_verified(path, &manifest.vision_sha256)
    }

    /// Return the vision model path without network side effects.
    pub fn get_vision_model_offline(&self) -> Result<PathBuf, ModelError> {
        let manifest = self.load_manifest()?;
        self.ensure_verified(self.vision_model_path(), &manifest.vision_sha256)
    }

    /// Download and stage the model artifact, capturing its checksum.
    pub fn setup_models(&self) -> Result<(), ModelError> {
        let path = self.vision_model_path();

        if !path.exists() {
            tracing::info!("Downloading model artifact {} -> {:?}", VISION_MODEL_URL, path);
            self.download_file(VISION_MODEL_URL, &path)?;
        }

        let manifest = ModelManifest {
            version: 1,
            vision_sha256: compute_sha256(&path)?,
        };
        self.write_manifest(&manifest)?;

        // Verify immediately to catch I/O races or corruption before returning.
        self.verify_expected_hash(&path, &manifest.vision_sha256)?;
        Ok(())
    }

    fn download_file(&self, url: &str, dest: &Path) -> Result<(), ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(reqwest::Error::from)?;

        let tmp_path = dest.with_extension("tmp");
        let mut response = client.get(url).send()?.error_for_status()?;
        let mut file = File::create(&tmp_path)?;
        response.copy_to(&mut file)?;
        file.sync_all()?;
        fs::rename(&tmp_path, dest)?;
        sync_parent_dir(dest)?;
        Ok(())
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_sha256(path: &Path) -> Result<String, ModelError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sync_parent_dir(path: &Path) -> Result<(), ModelError> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}
