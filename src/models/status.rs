use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for the status endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Open document sessions in this process
    pub documents: u32,
    /// Connections attached across all sessions
    pub connections: u32,
    /// Sessions with unsaved edits
    pub dirty_documents: u32,
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_total: u64,
}
