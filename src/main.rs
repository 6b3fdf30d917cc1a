//! Retina CLI
//!
//! Visual similarity search for e-commerce catalogs.
//!
//! # Usage
//!
//! ```bash
//! # Download the embedding model
//! retina setup-models --model-dir ./models
//!
//! # Start the server
//! retina serve --database catalog.sqlite3 --port 8001
//!
//! # Rebuild the index offline and exit
//! retina rebuild --database catalog.sqlite3
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use retina::catalog::SqliteCatalog;
use retina::config::Config;
use retina::embedder::ImageEmbedder;
use retina::fetch::HttpImageSource;
use retina::manager::IndexManager;
use retina::server::{serve, AppState};
use retina_core::FlatIndex;
use retina_vision::{ClipEncoder, EMBEDDING_DIM, MODEL_NAME};

#[derive(Parser)]
#[command(name = "retina")]
#[command(about = "Visual similarity search service for e-commerce catalogs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to the catalog SQLite database
        #[arg(long)]
        database: Option<PathBuf>,

        /// Directory for persisted index artifacts
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Directory holding the staged embedding model
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Rebuild the index from the catalog and exit
    Rebuild {
        /// Path to the catalog SQLite database
        #[arg(long)]
        database: Option<PathBuf>,

        /// Directory for persisted index artifacts
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Directory holding the staged embedding model
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },

    /// Download and verify the embedding model ahead of serving
    SetupModels {
        /// Model directory (defaults to ./models)
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },

    /// Display statistics about a persisted index directory
    Stats {
        /// Index directory
        #[arg(short, long, default_value = "index")]
        index_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            database,
            index_dir,
            model_dir,
            host,
            port,
        } => {
            let mut config = Config::from_env();
            if let Some(database) = database {
                config.database_path = database;
            }
            if let Some(index_dir) = index_dir {
                config.index_dir = index_dir;
            }
            if let Some(model_dir) = model_dir {
                config.model_dir = model_dir;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            tracing::info!("Starting Retina visual search service");

            let manager = {
                let config = config.clone();
                tokio::task::spawn_blocking(move || build_manager(&config)).await??
            };

            // Synchronous load-or-build before accepting traffic; an empty
            // or unreachable catalog leaves the manager queryable-for-503,
            // it never fails startup.
            let startup = manager.clone();
            tokio::task::spawn_blocking(move || startup.load_or_build()).await?;

            let status = manager.status();
            tracing::info!(
                "Retina is up: {} vectors indexed, ready={}",
                status.total_vectors,
                status.ready
            );

            let state = Arc::new(AppState {
                embedder: manager.embedder(),
                manager,
                top_k: config.top_k,
                model_name: MODEL_NAME.to_string(),
                allowed_origins: config.allowed_origins.clone(),
            });

            let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
            serve(state, addr).await?;
        }

        Commands::Rebuild {
            database,
            index_dir,
            model_dir,
        } => {
            let mut config = Config::from_env();
            if let Some(database) = database {
                config.database_path = database;
            }
            if let Some(index_dir) = index_dir {
                config.index_dir = index_dir;
            }
            if let Some(model_dir) = model_dir {
                config.model_dir = model_dir;
            }

            let summary = tokio::task::spawn_blocking(move || {
                let manager = build_manager(&config)?;
                manager.rebuild_blocking()
            })
            .await??;

            println!(
                "Rebuild complete: {}/{} products indexed, {} skipped",
                summary.indexed, summary.products, summary.skipped
            );
        }

        Commands::SetupModels { model_dir } => {
            tracing::info!("Setting up models in {:?}", model_dir);
            tokio::task::spawn_blocking(move || {
                ClipEncoder::setup_models(&model_dir)?;
                println!("Models downloaded and verified in {:?}", model_dir);
                Ok::<_, anyhow::Error>(())
            })
            .await??;
        }

        Commands::Stats { index_dir } => match FlatIndex::load(&index_dir, EMBEDDING_DIM)? {
            Some(index) => {
                println!("Index directory: {:?}", index_dir);
                println!("  Vectors: {}", index.len());
                println!("  Dimensions: {}", index.dim());
                println!("  Products: {}", index.product_ids().len());
            }
            None => {
                eprintln!("No persisted index found in {:?}", index_dir);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn build_manager(config: &Config) -> anyhow::Result<Arc<IndexManager>> {
    let catalog = Arc::new(SqliteCatalog::open(&config.database_path)?);
    let images = Arc::new(HttpImageSource::new(config.fetch_timeout)?);
    let encoder = ClipEncoder::new(&config.model_dir)
        .context("loading CLIP encoder (run `retina setup-models` first)")?;
    let embedder: Arc<dyn ImageEmbedder> = Arc::new(encoder);
    anyhow::ensure!(
        embedder.dim() == config.dim,
        "embedder produces {}-dim vectors, index expects {}",
        embedder.dim(),
        config.dim
    );

    Ok(Arc::new(IndexManager::new(
        config.dim,
        config.index_dir.clone(),
        catalog,
        images,
        embedder,
    )))
}
