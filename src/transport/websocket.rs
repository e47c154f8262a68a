//! WebSocket transport over `tokio-tungstenite`.
//!
//! # Event Loop
//!
//! Each open link spawns one tokio task that handles:
//!
//! - Incoming frames from the endpoint, forwarded as [`TransportEvent`]s
//! - Outgoing frames queued by [`Transport::send`]
//! - Graceful close requests
//!
//! The task emits exactly one [`TransportEvent::Closed`] before it exits.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::connector::{Connector, OpenedTransport, Transport, TransportEvent};

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// LinkCommand
// ============================================================================

/// Internal commands for the event loop.
enum LinkCommand {
    /// Send a text frame.
    Text(String),
    /// Close the link.
    Close { code: u16, reason: String },
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// `wss://` endpoints need the `native-tls` cargo feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a connector.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<OpenedTransport> {
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(%url, status = %response.status(), "WebSocket handshake completed");

        Ok(WebSocketLink::spawn(ws_stream))
    }
}

// ============================================================================
// WebSocketLink
// ============================================================================

/// Write handle onto a running event loop.
struct WebSocketLink {
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl WebSocketLink {
    /// Spawns the event loop and returns the transport with its events.
    fn spawn(ws_stream: ClientStream) -> OpenedTransport {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, command_rx, events_tx));

        OpenedTransport::new(Box::new(Self { command_tx }), events_rx)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: ClientStream,
        mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut close_code: Option<u16> = None;
        let mut close_reason = String::new();

        loop {
            tokio::select! {
                // Incoming frames from the endpoint
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            let _ = events_tx.send(TransportEvent::Message(text.as_str().to_string()));
                        }

                        Some(Ok(WsMessage::Binary(bytes))) => {
                            match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => {
                                    let _ = events_tx.send(TransportEvent::Message(text));
                                }
                                Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                            }
                        }

                        Some(Ok(WsMessage::Close(frame))) => {
                            if let Some(frame) = frame {
                                close_code = Some(u16::from(frame.code));
                                close_reason = frame.reason.as_str().to_string();
                            }
                            debug!(code = ?close_code, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            close_reason = e.to_string();
                            let _ = events_tx.send(TransportEvent::Error(close_reason.clone()));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ping/Pong are answered by tungstenite
                        _ => {}
                    }
                }

                // Commands from the pool
                command = command_rx.recv() => {
                    match command {
                        Some(LinkCommand::Text(text)) => {
                            if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                close_reason = e.to_string();
                                let _ = events_tx.send(TransportEvent::Error(close_reason.clone()));
                                break;
                            }
                            trace!("Frame written");
                        }

                        Some(LinkCommand::Close { code, reason }) => {
                            debug!(code, %reason, "Closing WebSocket");
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.clone().into(),
                            };
                            let _ = ws_write.send(WsMessage::Close(Some(frame))).await;
                            let _ = ws_write.close().await;
                            close_code = Some(code);
                            close_reason = reason;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        let _ = events_tx.send(TransportEvent::Closed {
            code: close_code,
            reason: close_reason,
        });

        debug!("Event loop terminated");
    }
}

impl Transport for WebSocketLink {
    fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Text(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.command_tx
            .send(LinkCommand::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================
