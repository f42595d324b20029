use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::models::ErrorResponse;
use crate::state::AppState;
use crate::ws::connsession::ConnectionSession;

/// Channel names look like `doc-{documentId}`.
const CHANNEL_PREFIX: &str = "doc-";

/// Typed rejection for a connection attempt. Every variant terminates the
/// attempt before any document state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidChannel,
    AuthenticationRequired,
    AuthenticationFailed,
    AccessDenied,
}

impl RejectReason {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RejectReason::InvalidChannel => StatusCode::BAD_REQUEST,
            RejectReason::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            RejectReason::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            RejectReason::AccessDenied => StatusCode::FORBIDDEN,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidChannel => write!(f, "invalid channel name"),
            RejectReason::AuthenticationRequired => write!(f, "authentication required"),
            RejectReason::AuthenticationFailed => write!(f, "authentication failed"),
            RejectReason::AccessDenied => write!(f, "access denied"),
        }
    }
}

impl IntoResponse for RejectReason {
    fn into_response(self) -> Response {
        let code = self.status_code();
        (
            code,
            Json(ErrorResponse {
                code: code.as_u16(),
                status: "error".to_string(),
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Extract the document id from a channel name.
pub fn parse_channel(channel: &str) -> Result<String, RejectReason> {
    match channel.strip_prefix(CHANNEL_PREFIX) {
        Some(doc_id) if !doc_id.is_empty() => Ok(doc_id.to_string()),
        _ => Err(RejectReason::InvalidChannel),
    }
}

/// Pull the bearer token from the `token` query parameter, the Authorization
/// header, or the `auth_token` cookie, in that order.
pub fn extract_token(params: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = params.get("token") {
        if !token.is_empty() {
            return Some(token.clone());
        }
    }

    if let Some(auth_str) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return Some(
            auth_str
                .strip_prefix("Bearer ")
                .unwrap_or(auth_str)
                .to_string(),
        );
    }

    if let Some(cookie_header) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
            if cookie.name() == "auth_token" {
                return Some(cookie.value().to_string());
            }
        }
    }

    None
}

/// Admission control for an inbound connection. Either returns a populated
/// ConnectionSession or a typed rejection; no document I/O happens on any
/// rejection path, so unauthorized callers never cause a load or a save.
pub async fn admit(
    state: &Arc<AppState>,
    channel: &str,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<ConnectionSession, RejectReason> {
    let doc_id = parse_channel(channel)?;

    // Never silently proceed as anonymous
    let token = extract_token(params, headers).ok_or(RejectReason::AuthenticationRequired)?;

    let user = match state.identity.verify(&token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Authentication failed for document {}: {}", doc_id, e);
            return Err(RejectReason::AuthenticationFailed);
        }
    };

    // Fail closed: an erroring, timed-out or malformed access check is denial
    let grant = match state.store.verify_access(&doc_id, &user.id, &token).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!(
                "Access check failed for user {} on document {}: {}",
                user.id, doc_id, e
            );
            return Err(RejectReason::AccessDenied);
        }
    };
    if !grant.has_access {
        warn!("Access denied for user {} on document {}", user.id, doc_id);
        return Err(RejectReason::AccessDenied);
    }

    Ok(ConnectionSession {
        conn_id: Uuid::new_v4(),
        user,
        org_id: grant.organization_id,
        doc_id,
        can_write: grant.can_write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn channel_parsing_strips_the_doc_prefix() {
        assert_eq!(parse_channel("doc-42").unwrap(), "42");
        assert_eq!(
            parse_channel("doc-a1b2-c3d4").unwrap(),
            "a1b2-c3d4".to_string()
        );
    }

    #[test]
    fn malformed_channels_are_rejected() {
        assert_eq!(parse_channel("doc-"), Err(RejectReason::InvalidChannel));
        assert_eq!(parse_channel("42"), Err(RejectReason::InvalidChannel));
        assert_eq!(parse_channel(""), Err(RejectReason::InvalidChannel));
        assert_eq!(parse_channel("room-42"), Err(RejectReason::InvalidChannel));
    }

    #[test]
    fn token_prefers_query_parameter() {
        let mut params = HashMap::new();
        params.insert("token".to_string(), "from-query".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(
            extract_token(&params, &headers),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn token_falls_back_to_header_then_cookie() {
        let params = HashMap::new();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_token(&params, &headers),
            Some("from-header".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth_token=from-cookie"),
        );
        assert_eq!(
            extract_token(&params, &headers),
            Some("from-cookie".to_string())
        );

        assert_eq!(extract_token(&params, &HeaderMap::new()), None);
    }
}
