//! Route modules for the document portal server

pub mod collections;
pub mod health;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Build the application router without transport layers
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/collections", collections::router())
        .with_state(state)
}
