use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::{InitMessage, PongMessage, ReceivedMessage, SendMessage};
use crate::state::AppState;
use crate::ws::connsession::ConnectionSession;
use crate::ws::coordinator::{self, UpdateError};
use crate::ws::{gateway, presence};

/// WebSocket entry point. Admission runs before the upgrade completes, so a
/// rejected caller gets a plain HTTP error and never reaches a session.
pub async fn collaboration_handler(
    Path(channel): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    match gateway::admit(&state, &channel, &params, &headers).await {
        Ok(conn) => {
            info!(
                "Connection admitted for document {} (user {})",
                conn.doc_id,
                conn.user.display_name()
            );
            ws.on_upgrade(move |socket| handle_socket(socket, state, conn))
        }
        Err(reason) => {
            warn!("Connection rejected for channel {}: {}", channel, reason);
            reason.into_response()
        }
    }
}

/// Handle one attached connection until it disconnects.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, conn: ConnectionSession) {
    let session = coordinator::attach(&state, &conn).await;

    // Subscribe before sending the snapshot so no fan-out is lost in between
    let mut rbc = session.broadcast.subscribe();

    let (sender, mut receiver) = socket.split();
    let sender1 = Arc::new(tokio::sync::Mutex::new(sender));
    let sender2 = sender1.clone();

    // First frame: full document snapshot plus who is already here
    let init = match session.export_snapshot().await {
        Ok(snapshot) => SendMessage::Init(InitMessage {
            snapshot,
            presence: presence::snapshot(&session).await,
        }),
        Err(e) => {
            error!("Failed to snapshot document {}: {}", conn.doc_id, e);
            coordinator::detach(&state, &conn).await;
            return;
        }
    };
    let init_text = serde_json::to_string(&init).unwrap();
    if sender1.lock().await.send(Message::Text(init_text)).await.is_err() {
        coordinator::detach(&state, &conn).await;
        return;
    }

    // Task reading frames from the client
    let recv_state = state.clone();
    let recv_session = session.clone();
    let recv_conn = conn.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(Ok(Message::Text(msg))) = receiver.next().await {
            let parsed: ReceivedMessage = match serde_json::from_str(&msg) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        "Dropping malformed frame on document {}: {}",
                        recv_conn.doc_id, e
                    );
                    continue;
                }
            };

            match parsed {
                ReceivedMessage::Update(update) => {
                    match coordinator::apply_update(&recv_state, &recv_session, &recv_conn, update)
                        .await
                    {
                        Ok(()) => {}
                        Err(UpdateError::ReadOnly) => {
                            warn!(
                                "Dropping update from read-only connection {} on document {}",
                                recv_conn.conn_id, recv_conn.doc_id
                            );
                        }
                        Err(UpdateError::Protocol(e)) => {
                            warn!(
                                "Dropping malformed update from connection {} on document {}: {}",
                                recv_conn.conn_id, recv_conn.doc_id, e
                            );
                        }
                    }
                }
                ReceivedMessage::Cursor(cursor) => {
                    presence::update_cursor(&recv_session, &recv_conn, cursor.cursor).await;
                }
                ReceivedMessage::Ping(_) => {
                    let pong = SendMessage::Pong(PongMessage {
                        date: Utc::now().to_rfc3339(),
                    });
                    let pong_text = serde_json::to_string(&pong).unwrap();
                    if sender1.lock().await.send(Message::Text(pong_text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Task relaying fan-out messages to this client
    let conn_id = conn.conn_id.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Ok(broadcast_msg) = rbc.recv().await {
            // Skip messages from this connection to prevent echo
            if broadcast_msg.sender_id == conn_id {
                continue;
            }
            if sender2
                .lock()
                .await
                .send(Message::Text(broadcast_msg.content))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Cleanup runs on every disconnect path, abnormal closure included
    coordinator::detach(&state, &conn).await;
    info!(
        "Connection {} detached from document {}",
        conn.conn_id, conn.doc_id
    );
}
