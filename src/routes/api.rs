use axum::{routing::get, Router};
use std::sync::Arc;

use crate::handlers::{health_check, status};
use crate::state::AppState;

/// Create API routes
pub fn create_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/status", get(status))
}
