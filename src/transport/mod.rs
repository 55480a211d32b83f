//! Transport layer: the byte pipe a channel rides on.
//!
//! Two interchangeable strategies implement [`Transport`]:
//!
//! ```text
//! ┌─────────────┐   events (mpsc)    ┌──────────────────┐
//! │   Channel   │◄───────────────────│ SocketTransport  │◄──► ws://host/path
//! │             │   send(text)       │        or        │
//! │             │───────────────────►│ PollingTransport │◄──► http push/pull
//! └─────────────┘                    └──────────────────┘
//! ```
//!
//! Transports carry already-encoded text frames. Each one reports its
//! lifecycle on a [`TransportEvent`] stream handed to it at open time; a
//! [`Connector`] opens a fresh transport on every (re)connect.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Persistent full-duplex WebSocket transport |
//! | `polling` | Half-duplex push/pull HTTP transport |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP long-polling transport.
pub mod polling;

/// WebSocket transport.
pub mod socket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{Settings, TransportKind};
use crate::error::{Error, Result};
use crate::request::{HttpClient, ReqwestHttpClient};

// ============================================================================
// Re-exports
// ============================================================================

pub use polling::{PollingConnector, PollingTransport};
pub use socket::{SocketConnector, SocketTransport};

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle and data events emitted by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport became ready.
    Open,
    /// A raw inbound text frame.
    Message(String),
    /// A transport-level error. Usually followed by [`TransportEvent::Close`].
    Error(Error),
    /// The transport is gone.
    Close,
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Message(_) => f.write_str("message"),
            Self::Error(_) => f.write_str("error"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// Sending half of a transport's event stream.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a transport's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// Transport
// ============================================================================

/// An open (or opening) byte pipe.
pub trait Transport: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> TransportKind;

    /// Returns `true` if [`Transport::send`] would hand the frame to the wire.
    fn is_ready(&self) -> bool;

    /// Sends one encoded frame.
    ///
    /// Returns `false` without sending when the transport is not ready.
    fn send(&self, text: String) -> bool;

    /// Closes the transport. A [`TransportEvent::Close`] follows.
    fn close(&self);
}

// ============================================================================
// Connector
// ============================================================================

/// Opens transports.
///
/// `connect` must not block: the returned transport starts opening in the
/// background and reports progress on `events`.
pub trait Connector: Send + Sync + 'static {
    /// Opens a new transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be built.
    fn connect(&self, events: EventSender) -> Result<Arc<dyn Transport>>;
}

/// Builds the connector selected by `settings.transport`.
///
/// # Errors
///
/// Returns [`crate::Error::Url`] if the endpoint URL is invalid.
pub fn connector_for(settings: &Arc<Settings>) -> Result<Arc<dyn Connector>> {
    Ok(match settings.transport {
        TransportKind::Websocket => Arc::new(SocketConnector::from_settings(settings)?),
        TransportKind::Polling => {
            let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
            Arc::new(PollingConnector::new(Arc::clone(settings), client))
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
