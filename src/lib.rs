//! Webchannels - resilient multiplexed channel client.
//!
//! This library keeps one or more logical "channels" connected to a
//! server, over a persistent WebSocket or an HTTP push/pull fallback, and
//! fans inbound frames out to registered handlers.
//!
//! # Architecture
//!
//! ```text
//! collaborator ──send()──► Channel ──Codec.encode──► Transport ──► server
//! collaborator ◄─handlers── Channel ◄─Codec.decode── Transport ◄── server
//! ```
//!
//! Key design principles:
//!
//! - Each [`Channel`] owns its transport, replaced wholesale on reconnect
//! - Every envelope a channel sends carries that channel's own route
//! - A bad frame never tears a connection down
//! - Stale timers are invalidated by a per-channel generation counter
//!
//! # Quick Start
//!
//! ```no_run
//! use webchannels::{ChannelRegistry, Result, Settings, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::new().with_websocket_endpoint("localhost", 8001);
//!     let registry = ChannelRegistry::new(settings)?;
//!
//!     let channel = registry.init_default_channel();
//!     channel.handlers().on_subscription(|route| println!("{route} subscribed"));
//!     channel.handlers().on_processing(|event| println!("{:?}", event.payload));
//!
//!     channel.send("hello", Value::object([("name", "world")])).await?;
//!
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`alert`] | Connectivity alert predicates and state |
//! | [`backoff`] | Reconnect backoff |
//! | [`channel`] | [`Channel`] state machine and handlers |
//! | [`config`] | [`Settings`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Values, envelopes and the codec |
//! | [`registry`] | [`ChannelRegistry`] |
//! | [`request`] | Retrying HTTP request |
//! | [`transport`] | Socket and polling transports |

// ============================================================================
// Modules
// ============================================================================

/// Connectivity alert.
pub mod alert;

/// Exponential backoff with jitter.
pub mod backoff;

/// Channels: one logical subscription per route.
///
/// - [`Channel`] - route, transport, handler lists, handshake
/// - [`ChannelHandlers`] - the six handler lists
pub mod channel;

/// Configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire protocol: values, envelopes, codec.
pub mod protocol;

/// Channel registry.
pub mod registry;

/// Retrying HTTP request primitive for the polling transport.
pub mod request;

/// Transport strategies.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use alert::AlertSignal;
pub use channel::{
    Channel, ChannelHandlers, ChannelState, CommandHandler, ErrorEvent, MessageEvent,
    ProcessingEvent,
};
pub use registry::ChannelRegistry;

// Configuration
pub use config::{Environment, Settings, TransportKind};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, Route};

// Protocol types
pub use protocol::{Codec, Decoded, Envelope, Transform, Value};

// Transport types
pub use transport::{Connector, Transport, TransportEvent};
