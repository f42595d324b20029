use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::clients::identity_client::IdentityClient;
use crate::clients::store_client::StoreClient;
use crate::config::Config;
use crate::ws::docsession::DocSession;

/// Shared application state. The session map is the only cross-connection
/// shared resource; its write lock arbitrates the race between a last
/// connection detaching and a new connection attaching for the same document.
pub struct AppState {
    pub config: Config,
    pub identity: IdentityClient,
    pub store: StoreClient,
    pub sessions: RwLock<HashMap<String, Arc<DocSession>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let identity = IdentityClient::new(
            config.identity_base_url.clone(),
            config.request_timeout(),
        );
        let store = StoreClient::new(
            config.api_base_url.clone(),
            config.server_secret.clone(),
            config.request_timeout(),
        );

        Arc::new(Self {
            config,
            identity,
            store,
            sessions: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
        })
    }
}
