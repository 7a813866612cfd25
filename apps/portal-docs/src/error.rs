//! Error types for the document portal server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::document::DocumentError;
use crate::raster::RasterizeError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid document: {0}")]
    Document(#[from] DocumentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Rasterization error: {0}")]
    Rasterize(#[from] RasterizeError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Document(e) => (StatusCode::BAD_REQUEST, "invalid_document", e.to_string()),
            AppError::Store(e) => match e {
                StoreError::DuplicateId { .. } => (StatusCode::CONFLICT, "conflict", e.to_string()),
                StoreError::ConcurrentModification { .. } => {
                    (StatusCode::CONFLICT, "conflict", e.to_string())
                }
                StoreError::MissingCollection { .. } => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                _ => {
                    tracing::error!("Store error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "store_error",
                        "Store error".to_string(),
                    )
                }
            },
            AppError::Rasterize(e) => {
                tracing::warn!("Rasterization error: {}", e);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "rasterize_error",
                    e.to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
