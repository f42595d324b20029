use axum::{extract::State, Json};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::models::StatusResponse;
use crate::state::AppState;
use crate::ws::docsession::DocSession;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Status endpoint: open sessions, attached connections and process stats
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let sessions: Vec<Arc<DocSession>> = state.sessions.read().await.values().cloned().collect();

    let mut documents: u32 = 0;
    let mut connections: u32 = 0;
    let mut dirty_documents: u32 = 0;
    for session in &sessions {
        let stats = session.stats().await;
        documents += 1;
        connections += stats.connections as u32;
        if stats.dirty {
            dirty_documents += 1;
        }
    }

    // System stats
    let (cpu_usage, memory_used, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0),
        }
    };

    info!(
        "Status: CPU: {:.2}%, Mem: {}/{} MB, Docs: {}, Conn: {}, Dirty: {}",
        cpu_usage,
        memory_used / 1024 / 1024,
        memory_total / 1024 / 1024,
        documents,
        connections,
        dirty_documents
    );

    Json(StatusResponse {
        status: "running".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        documents,
        connections,
        dirty_documents,
        cpu_usage,
        memory_used,
        memory_total,
    })
}
