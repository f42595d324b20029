use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::ws::presence::PresenceEntry;

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    /// Binary CRDT update, base64-encoded inside the JSON frame.
    #[serde_as(as = "Base64")]
    pub delta: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    pub cursor: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {}

#[serde_as]
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    /// Full CRDT snapshot of the document at attach time.
    #[serde_as(as = "Base64")]
    pub snapshot: Vec<u8>,
    pub presence: Vec<PresenceEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelayedUpdateMessage {
    #[serde(flatten)]
    pub update: UpdateMessage,
    /// User id of the editor the update originated from.
    pub user: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum PresenceEvent {
    Join,
    Leave,
    Cursor,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub event: PresenceEvent,
    pub entry: PresenceEntry,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Messages a client may send over an attached connection.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "cursor")]
    Cursor(CursorMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
}

/// Messages the server sends to attached connections.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "init")]
    Init(InitMessage),
    #[serde(rename = "update")]
    Update(RelayedUpdateMessage),
    #[serde(rename = "presence")]
    Presence(PresenceMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

/// Envelope carried on a document's fan-out channel. Every attached
/// connection's send loop drops messages tagged with its own id.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub sender_id: String,
    pub content: String,
}
