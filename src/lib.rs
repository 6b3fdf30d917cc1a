//! Retina: visual similarity search for e-commerce catalogs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP API (axum)                        │
//! │     POST /api/search/visual, POST /api/index/rebuild        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        IndexManager                         │
//! │        load-or-build, atomic swap rebuild, status           │
//! └─────────────────────────────────────────────────────────────┘
//!               │                              │
//!               ▼                              ▼
//! ┌───────────────────────────┐  ┌─────────────────────────────┐
//! │   FlatIndex (retina-core) │  │  ClipEncoder (retina-vision)│
//! │  inner-product exact scan │  │   CLIP ViT-B/32 over ONNX   │
//! └───────────────────────────┘  └─────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod model;
pub mod server;

pub use catalog::{CatalogStore, ProductRecord, SqliteCatalog};
pub use config::Config;
pub use embedder::ImageEmbedder;
pub use fetch::{HttpImageSource, ImageSource};
pub use manager::{IndexManager, IndexState, IndexStatus};
pub use server::{create_router, serve, AppState};
