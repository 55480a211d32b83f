//! Channels: one logical subscription per route.
//!
//! A [`Channel`] owns its transport, a set of handler lists and the
//! subscribe/unsubscribe state machine. It is opened as soon as it is
//! created and reconnects with backoff while autosubscribe is enabled.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Channel struct and accessors |
//! | `state` | [`ChannelState`] |
//! | `handlers` | Handler lists, events, [`CommandHandler`] |
//! | `connection` | Connect, event pump, reconnect |
//! | `subscription` | Subscribe handshake, unsubscribe |
//! | `dispatch` | Inbound frame routing |
//! | `send` | Outbound and queued sends |
//!
//! # Example
//!
//! ```ignore
//! let channel = registry.init_channel("dashboard");
//!
//! channel.handlers().on_subscription(|route| println!("{route} ready"));
//! channel.handlers().on_processing(|event| println!("{:?}", event.payload));
//!
//! channel.send("refresh", Value::object([("page", 2)])).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod connection;
mod core;
mod dispatch;
mod handlers;
mod send;
mod state;
mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use core::ChannelContext;
pub use core::Channel;
pub use handlers::{
    ChannelHandlers, CommandHandler, ErrorEvent, Handler, HandlerList, MessageEvent,
    ProcessingEvent,
};
pub use state::ChannelState;
