//! Index lifecycle: load-or-build at startup, atomic swap on rebuild.
//!
//! # Concurrency model
//!
//! The manager is the single owner of the live [`FlatIndex`]. Readers take a
//! snapshot of the `ArcSwap` reference at the start of a search and use only
//! that snapshot; the rebuild path constructs a complete new index off to the
//! side and publishes it with one atomic store. A search in flight keeps the
//! old index alive through its `Arc` until it finishes, so it never observes
//! a mix of old and new data or a half-built index.
//!
//! At most one rebuild runs at a time; an overlapping trigger is rejected
//! rather than queued, so duplicate work is never silently doubled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use retina_core::{FlatIndex, IndexError, SearchHit};

use crate::catalog::CatalogStore;
use crate::embedder::ImageEmbedder;
use crate::fetch::ImageSource;

/// Lifecycle state of the index owned by the manager.
///
/// `Loading → Ready` is the happy startup path; `Loading → Empty` when the
/// catalog yields nothing usable. There is no failed terminal state: the
/// service stays up in `Empty` awaiting a manual rebuild trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Loading,
    Ready,
    Empty,
    Rebuilding,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexStatus {
    pub state: IndexState,
    pub ready: bool,
    pub total_vectors: usize,
    pub total_products: usize,
}

/// Outcome counters of one rebuild pass.
#[derive(Debug, Clone, Copy)]
pub struct RebuildSummary {
    pub products: usize,
    pub indexed: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("a rebuild is already in progress")]
pub struct RebuildInProgress;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("index is not ready")]
    NotReady,
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct IndexManager {
    dim: usize,
    index_dir: PathBuf,
    catalog: Arc<dyn CatalogStore>,
    images: Arc<dyn ImageSource>,
    embedder: Arc<dyn ImageEmbedder>,
    current: ArcSwap<FlatIndex>,
    state: RwLock<IndexState>,
    rebuild_active: AtomicBool,
}

impl IndexManager {
    pub fn new(
        dim: usize,
        index_dir: PathBuf,
        catalog: Arc<dyn CatalogStore>,
        images: Arc<dyn ImageSource>,
        embedder: Arc<dyn ImageEmbedder>,
    ) -> Self {
        Self {
            dim,
            index_dir,
            catalog,
            images,
            embedder,
            current: ArcSwap::from_pointee(FlatIndex::empty(dim)),
            state: RwLock::new(IndexState::Loading),
            rebuild_active: AtomicBool::new(false),
        }
    }

    pub fn embedder(&self) -> Arc<dyn ImageEmbedder> {
        self.embedder.clone()
    }

    /// Startup-only: load the persisted index, or build one from the catalog.
    ///
    /// Never fails the process over an empty or unreachable catalog: a
    /// fruitless build leaves the manager in `Empty`, queryable for 503s and
    /// awaiting a manual rebuild trigger.
    pub fn load_or_build(&self) {
        match FlatIndex::load(&self.index_dir, self.dim) {
            Ok(Some(index)) => {
                tracing::info!(
                    "Loaded existing index from {:?} ({} vectors).",
                    self.index_dir,
                    index.len()
                );
                let empty = index.is_empty();
                self.current.store(Arc::new(index));
                *self.state.write() = if empty {
                    IndexState::Empty
                } else {
                    IndexState::Ready
                };
            }
            Ok(None) => {
                tracing::info!("No existing index found. Building from catalog...");
                self.initial_build();
            }
            Err(e) => {
                tracing::warn!(
                    "Persisted index at {:?} is unreadable ({e}). Rebuilding from catalog...",
                    self.index_dir
                );
                self.initial_build();
            }
        }
    }

    fn initial_build(&self) {
        if let Err(e) = self.rebuild_blocking() {
            tracing::error!("Failed to build initial index: {e:#}");
            tracing::info!("You can trigger a rebuild later via POST /api/index/rebuild");
        }
    }

    /// Trigger a background rebuild.
    ///
    /// Rejected when one is already running; the guard is released by the
    /// spawned task in every outcome.
    pub fn start_rebuild(self: &Arc<Self>) -> Result<(), RebuildInProgress> {
        if self.rebuild_active.swap(true, Ordering::SeqCst) {
            return Err(RebuildInProgress);
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&manager);
            let result = tokio::task::spawn_blocking(move || worker.rebuild_blocking()).await;
            match result {
                Ok(Ok(summary)) => tracing::info!(
                    "Index rebuild finished: {}/{} products indexed, {} skipped.",
                    summary.indexed,
                    summary.products,
                    summary.skipped
                ),
                Ok(Err(e)) => tracing::error!("Index rebuild failed: {e:#}"),
                Err(e) => tracing::error!("Index rebuild task panicked: {e}"),
            }
            manager.rebuild_active.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    pub fn rebuild_in_progress(&self) -> bool {
        self.rebuild_active.load(Ordering::SeqCst)
    }

    /// Run one full rebuild pass on the calling thread.
    ///
    /// Best effort over available items: a single bad image never aborts the
    /// pass; only a wholesale failure (nothing embeddable) leaves the prior
    /// index authoritative.
    pub fn rebuild_blocking(&self) -> Result<RebuildSummary> {
        {
            // Keep `Loading` visible during the startup build; later passes
            // report `Rebuilding` while the prior index keeps serving.
            let mut state = self.state.write();
            if *state != IndexState::Loading {
                *state = IndexState::Rebuilding;
            }
        }

        let outcome = self.rebuild_inner();

        let snapshot = self.current.load();
        *self.state.write() = if snapshot.is_empty() {
            IndexState::Empty
        } else {
            IndexState::Ready
        };

        outcome
    }

    fn rebuild_inner(&self) -> Result<RebuildSummary> {
        tracing::info!("Starting index rebuild...");
        let products = self
            .catalog
            .fetch_products()
            .context("fetching catalog products")?;

        if products.is_empty() {
            tracing::warn!("No products found in catalog. Skipping index build.");
            return Ok(RebuildSummary {
                products: 0,
                indexed: 0,
                skipped: 0,
            });
        }

        let total = products.len();
        let mut embeddings = Vec::with_capacity(total);
        let mut product_ids = Vec::with_capacity(total);
        let mut skipped = 0usize;

        for (i, product) in products.iter().enumerate() {
            tracing::info!("Processing product {}/{}: {}", i + 1, total, product.name);
            let image = match self.images.fetch(&product.image_url) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Skipping product {} — failed to load image: {e:#}", product.id);
                    skipped += 1;
                    continue;
                }
            };
            match self.embedder.embed(&image) {
                Ok(embedding) => {
                    embeddings.push(embedding);
                    product_ids.push(product.id);
                }
                Err(e) => {
                    tracing::warn!("Skipping product {} — embedding failed: {e:#}", product.id);
                    skipped += 1;
                }
            }
        }

        if embeddings.is_empty() {
            tracing::error!("No embeddings generated. Index not replaced.");
            return Ok(RebuildSummary {
                products: total,
                indexed: 0,
                skipped,
            });
        }

        let index =
            FlatIndex::build(self.dim, &embeddings, &product_ids).context("building vector index")?;
        let indexed = index.len();

        // Publish first: searches already in flight keep their snapshot, new
        // calls see the complete replacement. Persist after; a failed save
        // leaves the new index live and the next successful rebuild rewrites
        // the directory.
        self.current.store(Arc::new(index));
        let snapshot = self.current.load_full();
        match snapshot.save(&self.index_dir) {
            Ok(()) => tracing::info!("Index rebuilt and saved with {} products.", indexed),
            Err(e) => tracing::error!("Failed to persist index to {:?}: {e}", self.index_dir),
        }

        Ok(RebuildSummary {
            products: total,
            indexed,
            skipped,
        })
    }

    /// Whether searches can be served right now.
    ///
    /// `Rebuilding` stays ready as long as a prior index is live; `Loading`
    /// and `Empty` surface as not-ready.
    pub fn is_ready(&self) -> bool {
        match *self.state.read() {
            IndexState::Ready => true,
            IndexState::Rebuilding => !self.current.load().is_empty(),
            IndexState::Loading | IndexState::Empty => false,
        }
    }

    /// Top-k search against the current index snapshot.
    ///
    /// The snapshot is captured once and used end-to-end; a rebuild finishing
    /// mid-call cannot affect the result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if !self.is_ready() {
            return Err(SearchError::NotReady);
        }
        let snapshot = self.current.load_full();
        Ok(snapshot.search(query, k)?)
    }

    /// Pure read of the current state; never blocks on an in-flight rebuild.
    pub fn status(&self) -> IndexStatus {
        let snapshot = self.current.load();
        let state = *self.state.read();
        IndexStatus {
            state,
            ready: self.is_ready(),
            total_vectors: snapshot.len(),
            total_products: snapshot.product_ids().len(),
        }
    }
}
