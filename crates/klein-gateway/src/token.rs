//! Realtime token proxy.
//!
//! Exchanges the server-held FAL key for a short-lived token scoped to one
//! app alias, so the key never reaches a client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use klein_core::config::DEFAULT_APP;
use klein_core::protocol::is_truthy;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::state::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub app: Option<String>,
}

/// Tokens are validated against the app alias: the second path segment of
/// the app id (`fal-ai/flux-2/klein` → `flux-2`), or the whole id if it has
/// no second segment.
pub fn app_alias(app: &str) -> &str {
    app.split('/').nth(1).unwrap_or(app)
}

/// Unwrap the issuance response into a bare token.
///
/// The service answers with a JSON-encoded string; older deployments wrap it
/// as `{"detail": "<token>"}`. Non-JSON bodies pass through unchanged.
pub fn unwrap_token_response(raw: &str) -> String {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(_) => return raw.to_string(),
    };

    let detail = value
        .as_object()
        .and_then(|map| map.get("detail"))
        .filter(|detail| is_truthy(detail))
        .cloned();
    let token = detail.unwrap_or(value);

    match token {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// `POST /api/fal/realtime-token`
pub async fn issue_token(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.check(peer.ip()) {
            return (StatusCode::TOO_MANY_REQUESTS, "Too many token requests").into_response();
        }
    }

    // A missing or malformed body means "use the default app".
    let request: TokenRequest = serde_json::from_slice(&body).unwrap_or_default();
    let app = request.app.unwrap_or_else(|| DEFAULT_APP.to_string());
    let alias = app_alias(&app);

    let Some(fal_key) = state.fal_key.as_deref() else {
        error!("Token requested but no FAL key is configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "FAL key not configured").into_response();
    };

    debug!(%app, alias, peer = %peer, "Issuing realtime token");
    let upstream = state
        .http
        .post(&state.gateway.token_api_url)
        .header("Authorization", format!("Key {fal_key}"))
        .json(&json!({
            "allowed_apps": [alias],
            "token_expiration": state.gateway.token_expiration_secs,
        }))
        .send()
        .await;

    let resp = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "Token fetch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Token generation failed").into_response();
        }
    };

    let status = resp.status();
    let text = match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Token fetch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Token generation failed").into_response();
        }
    };

    if !status.is_success() {
        error!(status = status.as_u16(), body = %text, "Token error");
        let status =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, text).into_response();
    }

    info!(alias, "Realtime token issued");
    unwrap_token_response(&text).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_alias() {
        assert_eq!(app_alias("fal-ai/flux-2/klein"), "flux-2");
        assert_eq!(app_alias("fal-ai/other"), "other");
        assert_eq!(app_alias("standalone"), "standalone");
        assert_eq!(app_alias("fal-ai/"), "");
    }

    #[test]
    fn test_unwrap_json_string() {
        assert_eq!(unwrap_token_response("\"eyJhbGciOi.abc\""), "eyJhbGciOi.abc");
    }

    #[test]
    fn test_unwrap_legacy_detail() {
        assert_eq!(unwrap_token_response(r#"{"detail": "tok-123"}"#), "tok-123");
    }

    #[test]
    fn test_unwrap_raw_text() {
        assert_eq!(unwrap_token_response("plain-token"), "plain-token");
    }

    #[test]
    fn test_unwrap_other_json_is_serialized() {
        assert_eq!(unwrap_token_response(r#"{"token": "x"}"#), r#"{"token":"x"}"#);
        assert_eq!(unwrap_token_response(r#"{"detail": ""}"#), r#"{"detail":""}"#);
        assert_eq!(unwrap_token_response("42"), "42");
    }
}
