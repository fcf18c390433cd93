//! Realtime generation session: debounce, watchdog, credentials, WebSocket
//! transport and the session controller that ties them together.

pub mod controller;
pub mod debounce;
pub mod display;
pub mod timer;
pub mod token;
pub mod transport;
pub mod watchdog;
pub mod ws;

pub use controller::{SessionCommand, SessionController, SessionHandle, SharedSurface};
pub use display::DisplayState;
pub use token::{HttpTokenProvider, TokenError, TokenProvider};
pub use transport::{TransportChannel, TransportConnector, TransportError, TransportEvent};
pub use ws::{WsChannel, WsConnector};
