use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::models::{RelayedUpdateMessage, SendMessage, UpdateMessage};
use crate::state::AppState;
use crate::ws::connsession::ConnectionSession;
use crate::ws::docsession::{DocSession, SessionState};
use crate::ws::presence;

/// Why an update from a connection was not applied. The session keeps serving
/// other connections in either case.
#[derive(Debug)]
pub enum UpdateError {
    ReadOnly,
    Protocol(String),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::ReadOnly => write!(f, "connection has no write capability"),
            UpdateError::Protocol(e) => write!(f, "{}", e),
        }
    }
}

/// Attach an admitted connection to its document's session, creating the
/// session on first connection. The first connection to a cold document pays
/// the load latency; later ones await the same completed load.
pub async fn attach(state: &Arc<AppState>, conn: &ConnectionSession) -> Arc<DocSession> {
    let session = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .entry(conn.doc_id.clone())
            .or_insert_with(|| DocSession::new(conn.doc_id.clone()))
            .clone();
        let mut guard = session.inner.lock().await;
        guard.connections.insert(conn.conn_id);
        session.clone()
    };

    session.ensure_loaded(state).await;
    presence::join(&session, conn).await;

    info!(
        "Connection {} attached to document {} ({} attached)",
        conn.conn_id,
        conn.doc_id,
        session.stats().await.connections
    );
    session
}

/// Apply one update to the shared document state exactly once, then fan it
/// out to every other attached connection and (re)arm the debounced save.
pub async fn apply_update(
    state: &Arc<AppState>,
    session: &Arc<DocSession>,
    conn: &ConnectionSession,
    update: UpdateMessage,
) -> Result<(), UpdateError> {
    if !conn.can_write {
        return Err(UpdateError::ReadOnly);
    }

    session
        .import_update(&update.delta)
        .await
        .map_err(UpdateError::Protocol)?;
    session.schedule_save(state).await;

    let relayed = SendMessage::Update(RelayedUpdateMessage {
        update,
        user: conn.user.id.clone(),
    });
    session.relay(&conn.conn_id, serde_json::to_string(&relayed).unwrap());
    Ok(())
}

/// Detach a connection from its document's session. When the connection set
/// empties the session is flushed (if dirty) and torn down; the session map's
/// write lock is held across the flush so a racing attach for the same
/// document observes the saved state.
pub async fn detach(state: &Arc<AppState>, conn: &ConnectionSession) {
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get(&conn.doc_id).cloned() else {
        return;
    };

    presence::leave(&session, conn).await;

    let closing = {
        let mut guard = session.inner.lock().await;
        guard.connections.remove(&conn.conn_id);
        if guard.connections.is_empty() {
            guard.state = SessionState::Closing;
            if let Some(task) = guard.save_task.take() {
                task.abort();
            }
            true
        } else {
            false
        }
    };

    if closing {
        session.perform_save(state).await;
        sessions.remove(&conn.doc_id);
        info!("Closed session for document {}", conn.doc_id);
    }
}

/// Flush every open session; used on graceful shutdown.
pub async fn flush_all(state: &Arc<AppState>) {
    let sessions: Vec<Arc<DocSession>> = state.sessions.read().await.values().cloned().collect();
    for session in sessions {
        session.flush(state).await;
    }
}
