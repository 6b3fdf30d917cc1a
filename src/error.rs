//! Request-level error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::model::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed client input: wrong content type, oversized or empty
    /// upload, undecodable image. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The core has no usable index yet; the client may retry later.
    #[error("index is not ready")]
    NotReady,

    /// A rebuild is already running; overlapping triggers are rejected
    /// rather than silently duplicating a full catalog re-fetch.
    #[error("a rebuild is already in progress")]
    RebuildInProgress,

    /// Unexpected failure during embedding or search. Full detail is logged
    /// server-side; the client gets a generic message.
    #[error("processing error")]
    Processing(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RebuildInProgress => StatusCode::CONFLICT,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request",
            ApiError::NotReady => "not_ready",
            ApiError::RebuildInProgress => "rebuild_in_progress",
            ApiError::Processing(_) => "processing_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(reason) => reason.clone(),
            ApiError::NotReady => {
                "The search index is still initializing. Please try again in a moment.".to_string()
            }
            ApiError::RebuildInProgress => "An index rebuild is already in progress.".to_string(),
            ApiError::Processing(_) => "AI processing error.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Processing(source) = &self {
            tracing::error!("request processing failed: {source:#}");
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
