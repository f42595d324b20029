use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{PresenceEvent, PresenceMessage, SendMessage};
use crate::ws::connsession::ConnectionSession;
use crate::ws::docsession::DocSession;

/// Ephemeral per-connection presence metadata. Lives only while the
/// connection is attached; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub conn_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub cursor: Option<Value>,
    pub joined_at: DateTime<Utc>,
}

/// Register a connection's presence and announce it to peers.
pub async fn join(session: &DocSession, conn: &ConnectionSession) {
    let entry = PresenceEntry {
        conn_id: conn.conn_id,
        user_id: conn.user.id.clone(),
        name: conn.user.display_name().to_string(),
        avatar_url: conn.user.avatar_url.clone(),
        cursor: None,
        joined_at: Utc::now(),
    };

    {
        let mut guard = session.inner.lock().await;
        guard.presence.insert(conn.conn_id, entry.clone());
    }

    relay_event(session, conn, PresenceEvent::Join, entry);
}

/// Update a connection's cursor/selection and relay it to peers.
pub async fn update_cursor(session: &DocSession, conn: &ConnectionSession, cursor: Value) {
    let entry = {
        let mut guard = session.inner.lock().await;
        match guard.presence.get_mut(&conn.conn_id) {
            Some(entry) => {
                entry.cursor = Some(cursor);
                entry.clone()
            }
            None => return,
        }
    };

    relay_event(session, conn, PresenceEvent::Cursor, entry);
}

/// Remove a connection's presence and announce the departure. Runs on every
/// disconnect path, abnormal closure included, so no ghost entries survive.
pub async fn leave(session: &DocSession, conn: &ConnectionSession) {
    let removed = {
        let mut guard = session.inner.lock().await;
        guard.presence.remove(&conn.conn_id)
    };

    if let Some(entry) = removed {
        relay_event(session, conn, PresenceEvent::Leave, entry);
    }
}

/// Everyone currently attached to the document.
pub async fn snapshot(session: &DocSession) -> Vec<PresenceEntry> {
    let guard = session.inner.lock().await;
    let mut entries: Vec<PresenceEntry> = guard.presence.values().cloned().collect();
    entries.sort_by_key(|entry| entry.joined_at);
    entries
}

fn relay_event(
    session: &DocSession,
    conn: &ConnectionSession,
    event: PresenceEvent,
    entry: PresenceEntry,
) {
    let message = SendMessage::Presence(PresenceMessage { event, entry });
    session.relay(&conn.conn_id, serde_json::to_string(&message).unwrap());
}
