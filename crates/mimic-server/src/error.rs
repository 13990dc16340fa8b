//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by admin handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The capture store refused the operation.
    #[error("store error: {0}")]
    Store(#[from] mimic_core::CacheError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(error = %self, "admin request failed");

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Result type for admin handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
