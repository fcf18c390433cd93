//! WebSocket transport to the realtime inference service.
//!
//! Each channel owns a background worker. The worker fetches a fresh token
//! whenever it (re)opens the socket, throttles outbound frames so only the
//! newest queued request goes out per interval, and forwards inbound frames to
//! the controller as [`TransportEvent`]s. Requests are msgpack binary frames.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use klein_core::config::RealtimeConfig;
use klein_core::{FrameError, GenerationRequest, InboundFrame};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::token::TokenProvider;
use crate::transport::{TransportChannel, TransportConnector, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime endpoint for `app`, authenticated with `token`.
pub fn realtime_url(base_url: &str, app: &str, token: &str) -> String {
    format!(
        "{}/{}/realtime?fal_jwt_token={token}",
        base_url.trim_end_matches('/'),
        app.trim_matches('/')
    )
}

/// Opens [`WsChannel`]s using a token provider as credential source.
pub struct WsConnector {
    config: RealtimeConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl WsConnector {
    pub fn new(config: RealtimeConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { config, tokens }
    }
}

impl TransportConnector for WsConnector {
    fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportChannel>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = SocketWorker {
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            events,
            socket: None,
            connected_at: None,
        };

        info!(
            connection_key = %self.config.connection_key,
            app = %self.config.app,
            throttle_ms = self.config.throttle_interval_ms,
            "Realtime channel opened"
        );
        runtime.spawn(worker.run(outbound_rx, cancel.clone()));

        Ok(Box::new(WsChannel {
            outbound: outbound_tx,
            cancel,
        }))
    }
}

/// Handle to a worker-backed realtime connection.
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<GenerationRequest>,
    cancel: CancellationToken,
}

impl TransportChannel for WsChannel {
    fn send(&mut self, request: GenerationRequest) -> Result<(), TransportError> {
        self.outbound
            .send(request)
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SocketWorker {
    config: RealtimeConfig,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::UnboundedSender<TransportEvent>,
    socket: Option<WsStream>,
    connected_at: Option<Instant>,
}

impl SocketWorker {
    async fn run(
        mut self,
        mut outbound: mpsc::UnboundedReceiver<GenerationRequest>,
        cancel: CancellationToken,
    ) {
        let throttle = self.config.throttle_interval();
        let mut pending: Option<GenerationRequest> = None;
        let mut next_send_at = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = outbound.recv() => match request {
                    Some(request) => {
                        if pending.replace(request).is_some() {
                            debug!("Queued frame superseded by a newer one");
                        }
                    }
                    None => break,
                },
                message = next_message(&mut self.socket) => self.handle_message(message),
                _ = tokio::time::sleep_until(next_send_at), if pending.is_some() => {
                    if let Some(request) = pending.take() {
                        self.deliver(request).await;
                    }
                    next_send_at = Instant::now() + throttle;
                }
            }
        }

        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        debug!(connection_key = %self.config.connection_key, "Realtime worker stopped");
    }

    async fn deliver(&mut self, request: GenerationRequest) {
        if self.token_expired() {
            info!("Realtime token expired, reconnecting");
            self.disconnect().await;
        }

        if self.socket.is_none() {
            if let Err(e) = self.open().await {
                warn!(error = %e, "Realtime connect failed");
                self.emit(TransportEvent::Error(e));
                return;
            }
        }

        let payload = match request.to_msgpack() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize generation request");
                return;
            }
        };

        if let Some(socket) = self.socket.as_mut() {
            debug!(bytes = payload.len(), "Sending frame");
            if let Err(e) = socket.send(Message::Binary(payload.into())).await {
                warn!(error = %e, "Realtime send failed");
                self.socket = None;
                self.emit(TransportEvent::Error(TransportError::Socket(e.to_string())));
            }
        }
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let token = self.tokens.fetch_token(&self.config.app).await?;
        let url = realtime_url(&self.config.ws_base_url, &self.config.app, &token);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(base_url = %self.config.ws_base_url, app = %self.config.app, "Realtime socket connected");
        self.socket = Some(socket);
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        self.connected_at = None;
    }

    fn token_expired(&self) -> bool {
        self.connected_at
            .is_some_and(|at| at.elapsed() >= self.config.token_expiration())
    }

    fn handle_message(&mut self, message: Option<Result<Message, tungstenite::Error>>) {
        match message {
            Some(Ok(Message::Text(text))) => self.handle_frame(InboundFrame::parse(text.as_str())),
            Some(Ok(Message::Binary(bytes))) => self.handle_frame(InboundFrame::decode(&bytes)),
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "Realtime socket closed by server");
                self.socket = None;
                self.emit(TransportEvent::Error(TransportError::Closed));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Realtime socket error");
                self.socket = None;
                self.emit(TransportEvent::Error(TransportError::Socket(e.to_string())));
            }
            None => {
                self.socket = None;
                self.emit(TransportEvent::Error(TransportError::Closed));
            }
        }
    }

    fn handle_frame(&mut self, frame: Result<InboundFrame, FrameError>) {
        match frame {
            Ok(InboundFrame::Result(result)) => self.emit(TransportEvent::Result(result)),
            Ok(InboundFrame::ServiceMessage(message)) => {
                debug!(%message, "Service message");
            }
            Ok(InboundFrame::ServiceError { error, reason }) => {
                self.emit(TransportEvent::Error(TransportError::Service { error, reason }));
            }
            Err(e) => warn!(error = %e, "Ignoring unparseable frame"),
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Session controller gone, dropping transport event");
        }
    }
}

async fn next_message(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}
