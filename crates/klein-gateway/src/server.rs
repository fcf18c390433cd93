//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::GatewayState;
use crate::token::issue_token;

/// Build the gateway router.
///
/// `/api/fal/realtime-token`, `/health` and `/falailogo.png` are matched
/// first; every other path falls through to the public directory.
pub fn router(state: Arc<GatewayState>) -> Router {
    let public_dir = Path::new(&state.gateway.public_dir).to_path_buf();
    let logo_path = Path::new(&state.gateway.logo_path).to_path_buf();

    Router::new()
        .route("/api/fal/realtime-token", post(issue_token))
        .route("/health", get(health_handler))
        .route_service("/falailogo.png", ServeFile::new(logo_path))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state
        .gateway
        .bind
        .clone()
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let public_dir = state.gateway.public_dir.clone();

    let addr = format!("{bind_addr}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!("Port {port} is already in use. Kill the existing process and retry.");
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to bind {addr}"))),
    };

    if !Path::new(&public_dir).is_dir() {
        warn!(%public_dir, "Public directory not found; static assets will 404");
    }
    info!("Klein Realtime running at http://localhost:{port}");

    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    axum::Json(json!({
        "status": "ok",
        "version": version,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
