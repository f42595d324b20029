use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Liveness check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.config.service_name.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
