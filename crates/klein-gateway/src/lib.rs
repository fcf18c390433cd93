//! HTTP gateway for Klein Realtime.
//!
//! Keeps the FAL key server-side: browsers and the `klein` client ask
//! `/api/fal/realtime-token` for a short-lived, app-scoped token instead of
//! holding the key. Also serves the logo, static assets and `/health`.

pub mod rate_limit;
pub mod server;
pub mod state;
pub mod token;

pub use server::start_gateway;
pub use state::GatewayState;
