//! WebSocket transport.
//!
//! # Event Loop
//!
//! [`SocketTransport::open`] spawns a task that connects, then multiplexes:
//!
//! - inbound frames from the server (text frames become messages)
//! - outbound frames and the close command from the channel
//!
//! A socket error is reported as `Error` followed by `Close`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::config::{Settings, TransportKind};
use crate::error::{Error, Result};

use super::{Connector, EventSender, Transport, TransportEvent};

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write one text frame.
    Send(String),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// SocketTransport
// ============================================================================

/// A persistent full-duplex WebSocket.
///
/// `send` is a no-op until the handshake completes.
pub struct SocketTransport {
    url: Url,
    ready: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketTransport {
    /// Starts connecting to `url` in the background.
    #[must_use]
    pub fn open(url: Url, events: EventSender) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_event_loop(
            url.clone(),
            events,
            command_rx,
            Arc::clone(&ready),
        ));

        Self {
            url,
            ready,
            command_tx,
        }
    }

    /// The endpoint this socket talks to.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn run_event_loop(
        url: Url,
        events: EventSender,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        ready: Arc<AtomicBool>,
    ) {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(url = %url, error = %e, "WebSocket connect failed");
                let _ = events.send(TransportEvent::Error(Error::from(e)));
                let _ = events.send(TransportEvent::Close);
                return;
            }
        };

        debug!(url = %url, "WebSocket open");
        ready.store(true, Ordering::SeqCst);
        let _ = events.send(TransportEvent::Open);

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(url = %url, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(url = %url, error = %e, "WebSocket error");
                            let _ = events.send(TransportEvent::Error(Error::from(e)));
                            break;
                        }

                        None => {
                            debug!(url = %url, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(url = %url, error = %e, "Failed to send frame");
                                let _ = events.send(TransportEvent::Error(Error::from(e)));
                                break;
                            }
                        }

                        Some(SocketCommand::Shutdown) | None => {
                            debug!(url = %url, "Closing WebSocket");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        ready.store(false, Ordering::SeqCst);
        let _ = events.send(TransportEvent::Close);
        trace!(url = %url, "Socket event loop terminated");
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, text: String) -> bool {
        if !self.is_ready() {
            trace!(url = %self.url, "Socket not ready, frame not sent");
            return false;
        }
        self.command_tx.send(SocketCommand::Send(text)).is_ok()
    }

    fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// SocketConnector
// ============================================================================

/// Opens [`SocketTransport`]s against a fixed URL.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    url: Url,
}

impl SocketConnector {
    /// Creates a connector for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Creates a connector for the socket endpoint in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if the URL is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.websocket_url()?))
    }

    /// The endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for SocketConnector {
    fn connect(&self, events: EventSender) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(SocketTransport::open(self.url.clone(), events)))
    }
}

// ============================================================================
// Tests
// ============================================================================
