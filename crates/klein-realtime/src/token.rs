//! Short-lived credentials for the realtime connection.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token request failed ({status})")]
    Status { status: u16, body: String },

    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned an empty token")]
    Empty,
}

/// Issues scoped, short-lived tokens for a realtime application.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, app: &str) -> Result<String, TokenError>;
}

/// Fetches tokens from the gateway's credential endpoint.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self, app: &str) -> Result<String, TokenError> {
        debug!(url = %self.url, app, "Requesting realtime token");
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "app": app }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::Status { status, body });
        }

        let token = resp.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(token)
    }
}
