//! Flat inner-product index over product image embeddings.
//!
//! Stores a contiguous block of L2-normalized vectors and a parallel list of
//! product IDs; position `i` in one corresponds to position `i` in the other.
//! The index is never mutated in place: a rebuild constructs a complete new
//! value and the owner swaps it in wholesale, so readers always see either
//! the old index or the new one, never a mixture.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

use crate::format::{self, FormatError, VectorBlobWriter};
use crate::simd::dot_product;

/// Vector blob artifact name inside the index directory.
pub const VECTORS_FILE: &str = "vectors.rvi";

/// Product ID list artifact name inside the index directory.
pub const IDS_FILE: &str = "product_ids.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding/id count mismatch: {vectors} vectors, {ids} ids")]
    CountMismatch { vectors: usize, ids: usize },

    #[error("persisted artifacts disagree: blob holds {vectors} vectors, id list holds {ids}")]
    ArtifactMismatch { vectors: usize, ids: usize },

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("id list error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One search result: a catalog product and its similarity to the query.
///
/// `similarity` is the raw inner product rescaled to a 0-100 percentage and
/// rounded to two decimals. A display convention, not a probability.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub product_id: i64,
    pub similarity: f32,
}

/// Exact nearest-neighbor index: brute-force inner-product scan.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    /// Flattened row-major vector data, `len() == count * dim`.
    vectors: Vec<f32>,
    product_ids: Vec<i64>,
}

impl FlatIndex {
    /// Create an empty index of the given dimensionality.
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            product_ids: Vec::new(),
        }
    }

    /// Build an index from parallel embedding/product-id sequences.
    ///
    /// Every embedding must have length `dim` and the two sequences must have
    /// equal length. A failed build constructs nothing, so whatever index the
    /// caller currently holds is untouched.
    pub fn build(
        dim: usize,
        embeddings: &[Vec<f32>],
        product_ids: &[i64],
    ) -> Result<Self, IndexError> {
        if embeddings.len() != product_ids.len() {
            return Err(IndexError::CountMismatch {
                vectors: embeddings.len(),
                ids: product_ids.len(),
            });
        }

        let mut vectors = Vec::with_capacity(embeddings.len() * dim);
        for embedding in embeddings {
            if embedding.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.len(),
                });
            }
            vectors.extend_from_slice(embedding);
        }

        Ok(Self {
            dim,
            vectors,
            product_ids: product_ids.to_vec(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.product_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty()
    }

    pub fn product_ids(&self) -> &[i64] {
        &self.product_ids
    }

    /// Top-k scan by descending inner product.
    ///
    /// Returns up to `min(k, len)` hits. Ties keep insertion order (the sort
    /// is stable). An empty index yields an empty result, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, vector)| (row, dot_product(query, vector)))
            .collect();

        // Stable sort: equal scores preserve insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.min(self.len()));

        Ok(scored
            .into_iter()
            .map(|(row, score)| SearchHit {
                product_id: self.product_ids[row],
                similarity: to_percent(score),
            })
            .collect())
    }

    /// Persist the index as two co-located artifacts under `dir`.
    ///
    /// Both writes go through a temp file and an atomic rename so a crash
    /// mid-save never leaves a half-written artifact behind.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), IndexError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let blob_path = dir.join(VECTORS_FILE);
        let blob_tmp = dir.join(format!("{VECTORS_FILE}.tmp"));
        let mut writer = VectorBlobWriter::create(&blob_tmp, self.dim)?;
        for vector in self.vectors.chunks_exact(self.dim) {
            writer.write_vector(vector)?;
        }
        writer.finish()?;
        std::fs::rename(&blob_tmp, &blob_path)?;

        let ids_path = dir.join(IDS_FILE);
        let ids_tmp = dir.join(format!("{IDS_FILE}.tmp"));
        let payload = serde_json::to_vec(&self.product_ids)?;
        std::fs::write(&ids_tmp, payload)?;
        std::fs::rename(&ids_tmp, &ids_path)?;
        sync_dir(dir)?;

        Ok(())
    }

    /// Load a persisted index from `dir`.
    ///
    /// Returns `Ok(None)` when either artifact is absent, the normal
    /// "no index yet" condition. Present-but-inconsistent artifacts are a
    /// hard error: load is all-or-nothing.
    pub fn load<P: AsRef<Path>>(dir: P, dim: usize) -> Result<Option<Self>, IndexError> {
        let dir = dir.as_ref();
        let blob_path = dir.join(VECTORS_FILE);
        let ids_path = dir.join(IDS_FILE);

        if !blob_path.exists() || !ids_path.exists() {
            return Ok(None);
        }

        let (blob_dim, vectors) = format::read_blob(&blob_path)?;
        if blob_dim != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: blob_dim,
            });
        }

        let reader = BufReader::new(File::open(&ids_path)?);
        let product_ids: Vec<i64> = serde_json::from_reader(reader)?;

        let vector_count = if dim == 0 { 0 } else { vectors.len() / dim };
        if vector_count != product_ids.len() {
            return Err(IndexError::ArtifactMismatch {
                vectors: vector_count,
                ids: product_ids.len(),
            });
        }

        Ok(Some(Self {
            dim,
            vectors,
            product_ids,
        }))
    }
}

/// Rescale a raw inner product to a percentage, rounded to 2 decimals.
fn to_percent(score: f32) -> f32 {
    ((score as f64) * 10000.0).round() as f32 / 100.0
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}
