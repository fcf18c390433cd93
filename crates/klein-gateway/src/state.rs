//! Gateway shared state.

use std::sync::Arc;

use klein_core::config::{Config, GatewayConfig};
use tracing::warn;

use crate::rate_limit::RateLimiter;

/// Shared gateway state accessible from all handlers.
pub struct GatewayState {
    pub gateway: GatewayConfig,
    /// Server-held FAL key, resolved once at startup.
    pub fal_key: Option<String>,
    pub http: reqwest::Client,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl GatewayState {
    /// Build state from config. Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let gateway = config.gateway();

        let fal_key = gateway.resolve_fal_key();
        if fal_key.is_none() {
            warn!("No FAL key configured; token requests will fail");
        }

        let limit = gateway.rate_limit.clone().unwrap_or_default();
        let rate_limiter = (limit.max_tokens_per_minute > 0)
            .then(|| Arc::new(RateLimiter::new(limit.max_tokens_per_minute)));

        Self {
            gateway,
            fal_key,
            http: reqwest::Client::new(),
            rate_limiter,
        }
    }
}
