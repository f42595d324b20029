use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Identity of an authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserIdentity {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown User")
    }
}

/// Client for the external identity provider. Successful token verifications
/// are cached for a short TTL; failures are never cached.
pub struct IdentityClient {
    client: Client,
    base_url: String,
    cache: Cache<String, UserIdentity>,
}

impl IdentityClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        }
    }

    /// Verify a bearer token and resolve the caller's identity.
    pub async fn verify(&self, token: &str) -> Result<UserIdentity, String> {
        if let Some(identity) = self.cache.get(token).await {
            return Ok(identity);
        }

        let url = format!("{}/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| format!("Identity provider unreachable: {}", e))?;

        if !response.status().is_success() {
            return Err(format!(
                "Identity provider rejected token: {}",
                response.status()
            ));
        }

        let identity: UserIdentity = response
            .json()
            .await
            .map_err(|e| format!("Malformed identity response: {}", e))?;

        info!("Token verified for user {}", identity.id);
        self.cache.insert(token.to_string(), identity.clone()).await;
        Ok(identity)
    }
}
