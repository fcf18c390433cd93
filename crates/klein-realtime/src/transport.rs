//! Transport channel abstraction between the session controller and the
//! realtime service.

use klein_core::{GenerationRequest, GenerationResult};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::token::TokenError;

/// Asynchronous delivery from the transport to the controller.
#[derive(Debug)]
pub enum TransportEvent {
    Result(GenerationResult),
    Error(TransportError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("credential failure: {0}")]
    Token(#[from] TokenError),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("service error: {error}{}", reason_suffix(.reason))]
    Service { error: String, reason: Option<String> },

    #[error("connection closed")]
    Closed,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
}

/// A live duplex connection. `send` only enqueues; delivery, throttling and
/// reconnection happen behind it and failures surface as [`TransportEvent`]s.
pub trait TransportChannel: Send {
    fn send(&mut self, request: GenerationRequest) -> Result<(), TransportError>;
}

/// Opens transport channels. Results and errors for the opened channel are
/// delivered on `events`.
pub trait TransportConnector: Send + Sync {
    fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportChannel>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = TransportError::Service {
            error: "TIMEOUT".into(),
            reason: Some("idle".into()),
        };
        assert_eq!(err.to_string(), "service error: TIMEOUT (idle)");

        let err = TransportError::Service {
            error: "BAD".into(),
            reason: None,
        };
        assert_eq!(err.to_string(), "service error: BAD");
    }
}
