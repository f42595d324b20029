use uuid::Uuid;

use crate::clients::identity_client::UserIdentity;

/// Context attached to one admitted connection: identity, organization scope,
/// target document and write capability. Constructed once by the gateway at
/// admission time and passed explicitly to every subsequent operation; nothing
/// is smuggled through the socket object.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub conn_id: Uuid,
    pub user: UserIdentity,
    pub org_id: String,
    pub doc_id: String,
    pub can_write: bool,
}
