use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for the liveness check
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub uptime_secs: u64,
    pub timestamp: String,
}
