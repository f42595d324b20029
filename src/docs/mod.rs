use utoipa::OpenApi;

use crate::models::*;

/// Liveness check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Status endpoint
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Open sessions, connections and process stats", body = StatusResponse)
    )
)]
#[allow(dead_code)]
pub async fn status_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        status_doc,
    ),
    components(
        schemas(HealthResponse, StatusResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
