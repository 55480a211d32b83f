//! Handler lists and the events they receive.
//!
//! Every channel owns one [`ChannelHandlers`]; the registry owns another
//! set shared by all channels. For each transport event the channel's own
//! handlers fire first, then the registry-wide ones, each list in
//! registration order.
//!
//! ```ignore
//! channel.handlers().on_processing(|event| {
//!     if let Some(envelope) = event.envelope() {
//!         println!("{} -> {}", envelope.channel, envelope.message);
//!     }
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::identifiers::Route;
use crate::protocol::{Envelope, Value};

// ============================================================================
// Types
// ============================================================================

/// A registered callback.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

// ============================================================================
// Events
// ============================================================================

/// A transport or frame error on a channel.
#[derive(Debug)]
pub struct ErrorEvent {
    /// Route of the channel that saw the error.
    pub route: Route,
    /// What went wrong.
    pub error: Error,
}

/// A raw inbound frame, before decoding.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Route of the receiving channel.
    pub route: Route,
    /// Frame text as received.
    pub raw: String,
}

/// A decoded data frame.
///
/// Opaque text frames arrive as [`Value::String`].
#[derive(Debug, Clone)]
pub struct ProcessingEvent {
    /// Route of the receiving channel.
    pub route: Route,
    /// Decoded payload.
    pub payload: Value,
}

impl ProcessingEvent {
    /// Interprets the payload as an envelope.
    #[must_use]
    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::from_value(&self.payload)
    }
}

// ============================================================================
// HandlerList
// ============================================================================

/// An ordered, append-only list of callbacks.
///
/// Adding a handler that is already present (same `Arc`) is a no-op.
pub struct HandlerList<T> {
    handlers: RwLock<Vec<Handler<T>>>,
}

impl<T> Default for HandlerList<T> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for HandlerList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerList")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> HandlerList<T> {
    /// Appends `handler`. Returns `false` if it was already registered.
    pub fn add(&self, handler: Handler<T>) -> bool {
        let mut handlers = self.handlers.write();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        handlers.push(handler);
        true
    }

    /// Removes `handler`. Returns `false` if it was not registered.
    pub fn remove(&self, handler: &Handler<T>) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Number of registered handlers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` if no handler is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invokes every handler in registration order.
    ///
    /// The list is snapshotted first, so handlers may register more handlers.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self.handlers.read().clone();
        for handler in snapshot {
            handler(event);
        }
    }
}

// ============================================================================
// ChannelHandlers
// ============================================================================

/// The six handler lists of a channel (or of the registry).
#[derive(Debug, Default)]
pub struct ChannelHandlers {
    /// Transport opened.
    pub open: HandlerList<Route>,
    /// Transport closed.
    pub close: HandlerList<Route>,
    /// Transport or frame error.
    pub error: HandlerList<ErrorEvent>,
    /// Every raw inbound frame.
    pub message: HandlerList<MessageEvent>,
    /// Subscription acknowledged.
    pub subscription: HandlerList<Route>,
    /// Decoded data frames.
    pub processing: HandlerList<ProcessingEvent>,
}

impl ChannelHandlers {
    /// Registers an open handler.
    pub fn on_open<F>(&self, f: F) -> Handler<Route>
    where
        F: Fn(&Route) + Send + Sync + 'static,
    {
        register(&self.open, f)
    }

    /// Registers a close handler.
    pub fn on_close<F>(&self, f: F) -> Handler<Route>
    where
        F: Fn(&Route) + Send + Sync + 'static,
    {
        register(&self.close, f)
    }

    /// Registers an error handler.
    pub fn on_error<F>(&self, f: F) -> Handler<ErrorEvent>
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        register(&self.error, f)
    }

    /// Registers a raw message handler.
    pub fn on_message<F>(&self, f: F) -> Handler<MessageEvent>
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        register(&self.message, f)
    }

    /// Registers a subscription handler.
    pub fn on_subscription<F>(&self, f: F) -> Handler<Route>
    where
        F: Fn(&Route) + Send + Sync + 'static,
    {
        register(&self.subscription, f)
    }

    /// Registers a processing handler.
    pub fn on_processing<F>(&self, f: F) -> Handler<ProcessingEvent>
    where
        F: Fn(&ProcessingEvent) + Send + Sync + 'static,
    {
        register(&self.processing, f)
    }
}

fn register<T, F>(list: &HandlerList<T>, f: F) -> Handler<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    let handler: Handler<T> = Arc::new(f);
    list.add(Arc::clone(&handler));
    handler
}

// ============================================================================
// CommandHandler
// ============================================================================

/// Receives server-pushed eval commands.
///
/// The command text is handed over verbatim (prefix stripped, trimmed).
/// Nothing is evaluated unless a handler chooses to.
pub trait CommandHandler: Send + Sync {
    /// Executes one command.
    ///
    /// # Errors
    ///
    /// An error is reported to the channel's error handlers; the connection
    /// is unaffected.
    fn execute(&self, route: &Route, command: &str) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Route, &str) -> Result<()> + Send + Sync,
{
    fn execute(&self, route: &Route, command: &str) -> Result<()> {
        self(route, command)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    #[test]
    fn test_emit_in_registration_order() {
        let list: HandlerList<u32> = HandlerList::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            list.add(Arc::new(move |n: &u32| seen.lock().push(format!("{tag}:{n}"))));
        }
        list.emit(&7);

        assert_eq!(*seen.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let list: HandlerList<()> = HandlerList::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler: Handler<()> = Arc::new(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(list.add(Arc::clone(&handler)));
        assert!(!list.add(Arc::clone(&handler)));
        assert_eq!(list.len(), 1);

        list.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(list.remove(&handler));
        assert!(list.is_empty());
        assert!(!list.remove(&handler));
    }

    #[test]
    fn test_handler_may_register_during_emit() {
        let list: Arc<HandlerList<()>> = Arc::new(HandlerList::default());
        let inner = Arc::clone(&list);
        list.add(Arc::new(move |_: &()| {
            inner.add(Arc::new(|_: &()| {}));
        }));

        list.emit(&());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_channel_handlers_helpers() {
        let handlers = ChannelHandlers::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        handlers.on_subscription(move |route| {
            assert_eq!(route, "app");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handlers.subscription.emit(&Route::new("app"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handlers.open.is_empty());
    }

    #[test]
    fn test_processing_event_envelope() {
        let event = ProcessingEvent {
            route: Route::new("a"),
            payload: Value::object([("channel", "a"), ("message", "m")]),
        };
        let envelope = event.envelope().expect("envelope");
        assert_eq!(envelope.channel, "a");
        assert_eq!(envelope.message, "m");
    }

    #[test]
    fn test_closure_command_handler() {
        let handler = |route: &Route, command: &str| -> Result<()> {
            if command == "fail" {
                Err(Error::command(format!("{route}: rejected")))
            } else {
                Ok(())
            }
        };
        assert!(handler.execute(&Route::new("a"), "1+1").is_ok());
        assert!(handler.execute(&Route::new("a"), "fail").is_err());
    }
}
