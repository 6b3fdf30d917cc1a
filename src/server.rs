//! HTTP server for the visual search service.
//!
//! # Endpoints
//!
//! - `POST /api/search/visual` - upload an image, get similar products
//! - `POST /api/index/rebuild` - trigger a background index rebuild
//! - `GET /api/index/status` - index readiness and counts
//! - `GET /` - service banner

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::embedder::ImageEmbedder;
use crate::error::ApiError;
use crate::manager::{IndexManager, SearchError};
use crate::model::{
    RebuildAccepted, SearchResponse, SearchResultItem, ServiceInfo, StatusResponse,
};
use retina_vision::preprocess;

/// Maximum accepted size for an uploaded search image.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state.
///
/// Searches only read through the manager, which hands each call one index
/// snapshot; no handler takes a lock across an await point.
pub struct AppState {
    pub manager: Arc<IndexManager>,
    pub embedder: Arc<dyn ImageEmbedder>,
    pub top_k: usize,
    pub model_name: String,
    pub allowed_origins: Vec<String>,
}

/// POST /api/search/visual - find products visually similar to an upload.
async fn visual_search(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SearchResponse>, ApiError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?;
            upload = Some((content_type, bytes.to_vec()));
            break;
        }
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| ApiError::Validation("missing multipart field 'image'".to_string()))?;

    // An absent content type is tolerated (proxies strip it); a non-image
    // one is not.
    if let Some(ct) = &content_type {
        if !ct.starts_with("image/") {
            return Err(ApiError::Validation(
                "Invalid file type. Please upload an image (JPG, PNG, WebP).".to_string(),
            ));
        }
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::Validation(
            "Image too large. Maximum size is 10MB.".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(ApiError::Validation("Empty image file.".to_string()));
    }

    if !state.manager.is_ready() {
        return Err(ApiError::NotReady);
    }

    tracing::info!(
        "Encoding search image ({} bytes, type={:?})...",
        bytes.len(),
        content_type
    );

    let embedder = state.embedder.clone();
    let manager = state.manager.clone();
    let k = state.top_k;
    // Decode, embed, and scan off the async runtime.
    let hits = tokio::task::spawn_blocking(move || {
        let image = preprocess::decode_rgb(&bytes).map_err(|e| {
            ApiError::Validation(format!("Could not process the uploaded image: {e}"))
        })?;
        let query = embedder.embed(&image).map_err(ApiError::Processing)?;
        manager.search(&query, k).map_err(|e| match e {
            SearchError::NotReady => ApiError::NotReady,
            SearchError::Index(err) => ApiError::Processing(err.into()),
        })
    })
    .await
    .map_err(|e| ApiError::Processing(anyhow::anyhow!("search join error: {e}")))??;

    tracing::info!("Visual search returned {} results", hits.len());

    Ok(Json(SearchResponse {
        results: hits
            .into_iter()
            .map(|hit| SearchResultItem {
                product_id: hit.product_id,
                similarity: hit.similarity,
            })
            .collect(),
    }))
}

/// POST /api/index/rebuild - start a background rebuild.
///
/// Returns immediately; completion and failure are reported through the
/// status endpoint and the logs. A concurrent trigger gets 409.
async fn rebuild_index(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<RebuildAccepted>), ApiError> {
    state
        .manager
        .start_rebuild()
        .map_err(|_| ApiError::RebuildInProgress)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RebuildAccepted {
            status: "Index rebuild started".to_string(),
            message: "The index is being rebuilt in the background. This may take a few minutes."
                .to_string(),
        }),
    ))
}

/// GET /api/index/status - readiness and index counts.
async fn index_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.manager.status();
    Json(StatusResponse {
        status: if status.ready { "ready" } else { "not_ready" }.to_string(),
        total_vectors: status.total_vectors,
        total_products: status.total_products,
    })
}

/// GET / - service banner.
async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Retina Visual Search".to_string(),
        status: "running".to_string(),
        model: state.model_name.clone(),
    })
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparseable CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the axum router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/api/search/visual", post(visual_search))
        .route("/api/index/rebuild", post(rebuild_index))
        .route("/api/index/status", get(index_status))
        // Slack above the documented cap so the explicit size check answers
        // with a 400 instead of a transport-level rejection.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Start the server.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let router = create_router(state);

    tracing::info!("Starting Retina server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
