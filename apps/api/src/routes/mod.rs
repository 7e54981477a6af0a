pub mod export;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Pagination preview
        .route(
            "/api/v1/pagination/estimate",
            post(export::handle_estimate),
        )
        // PDF export from a rendered bitmap
        .route(
            "/api/v1/export",
            post(export::handle_export).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}
