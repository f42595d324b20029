use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::models::CanonicalDoc;

/// Header carrying the shared secret on every store call.
const SERVER_SECRET_HEADER: &str = "x-server-secret";

/// Result of a document access check. Consumed once at connection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub organization_id: String,
    pub has_access: bool,
    #[serde(default = "default_can_write")]
    pub can_write: bool,
}

fn default_can_write() -> bool {
    true
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessCheckRequest<'a> {
    document_id: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct DocumentContentResponse {
    content: Option<CanonicalDoc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveDocumentRequest<'a> {
    document_id: &'a str,
    content: &'a CanonicalDoc,
}

/// Client for the application API that owns the canonical document store and
/// the document access decision.
pub struct StoreClient {
    client: Client,
    base_url: String,
    server_secret: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: String, server_secret: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            server_secret,
        }
    }

    fn with_secret(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.server_secret {
            Some(secret) => request.header(SERVER_SECRET_HEADER, secret),
            None => request,
        }
    }

    /// Ask the application API whether `user_id` may open `doc_id`. Any
    /// transport error, timeout, non-2xx status or malformed body is an error
    /// for the caller to treat as denial.
    pub async fn verify_access(
        &self,
        doc_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<AccessGrant, String> {
        let url = format!("{}/access-check", self.base_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&AccessCheckRequest {
                document_id: doc_id,
                user_id,
            });

        let response = self
            .with_secret(request)
            .send()
            .await
            .map_err(|e| format!("Access check call failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Access check returned {}", response.status()));
        }

        response
            .json::<AccessGrant>()
            .await
            .map_err(|e| format!("Malformed access check response: {}", e))
    }

    /// Fetch the last-saved canonical form of a document. Returns `None` for
    /// documents that do not exist yet or have no content.
    pub async fn load_document(&self, doc_id: &str) -> Result<Option<CanonicalDoc>, String> {
        let url = format!("{}/documents/{}/content", self.base_url, doc_id);
        let request = self.client.get(&url);

        let response = self
            .with_secret(request)
            .send()
            .await
            .map_err(|e| format!("Document load call failed: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("Document load returned {}", response.status()));
        }

        let body: DocumentContentResponse = response
            .json()
            .await
            .map_err(|e| format!("Malformed document content response: {}", e))?;

        Ok(body.content)
    }

    /// Persist the current canonical form of a document.
    pub async fn save_document(&self, doc_id: &str, content: &CanonicalDoc) -> Result<(), String> {
        let url = format!("{}/documents/{}/collaboration", self.base_url, doc_id);
        let request = self.client.post(&url).json(&SaveDocumentRequest {
            document_id: doc_id,
            content,
        });

        let response = self
            .with_secret(request)
            .send()
            .await
            .map_err(|e| format!("Document save call failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Document save returned {}", response.status()));
        }

        info!("Document {} saved successfully", doc_id);
        Ok(())
    }
}
