//! Channel registry.
//!
//! Process-wide collection of channels, keyed by route for lookup and
//! iterated for broadcast and shutdown. Entries are never removed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             ChannelRegistry              │
//! │  settings · codec · connector            │
//! │  common handlers · command handler       │
//! │  alert state                             │
//! │  ┌────────────────────────────────────┐  │
//! │  │ "__"        → Channel (transport)  │  │
//! │  │ "dashboard" → Channel (transport)  │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::alert::{self, AlertSignal};
use crate::channel::{Channel, ChannelContext, ChannelHandlers, CommandHandler, Handler};
use crate::config::Settings;
use crate::error::Result;
use crate::identifiers::Route;
use crate::protocol::{Codec, Value};
use crate::transport::{Connector, connector_for};

// ============================================================================
// RegistryInner
// ============================================================================

/// Internal shared state for the registry.
pub(crate) struct RegistryInner {
    context: Arc<ChannelContext>,
    /// Channels in registration order.
    channels: RwLock<Vec<Channel>>,
    /// Route to position in `channels`.
    index: RwLock<FxHashMap<Route, usize>>,
}

impl RegistryInner {
    /// Returns the channel registered for exactly `route`.
    pub(crate) fn find_exact(&self, route: &str) -> Option<Channel> {
        let position = *self.index.read().get(route)?;
        self.channels.read().get(position).cloned()
    }

    fn first(&self) -> Option<Channel> {
        self.channels.read().first().cloned()
    }
}

// ============================================================================
// ChannelRegistry
// ============================================================================

/// Owns every channel of a page and the state they share.
///
/// Cheap to clone; clones share state. Must be used within a Tokio runtime.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.len())
            .field("banner_visible", &self.banner_visible())
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Creates a registry using the transport selected in `settings`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the settings are invalid
    /// - [`Error::Url`](crate::Error::Url) if the socket URL is invalid
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let connector = connector_for(&settings)?;
        Ok(Self::build(settings, connector))
    }

    /// Creates a registry with a custom connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the settings are invalid.
    pub fn with_connector(settings: Settings, connector: Arc<dyn Connector>) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(Arc::new(settings), connector))
    }

    fn build(settings: Arc<Settings>, connector: Arc<dyn Connector>) -> Self {
        debug!(transport = ?settings.transport, "Channel registry created");
        Self {
            inner: Arc::new(RegistryInner {
                context: Arc::new(ChannelContext::new(settings, connector)),
                channels: RwLock::new(Vec::new()),
                index: RwLock::new(FxHashMap::default()),
            }),
        }
    }
}

// ============================================================================
// ChannelRegistry - Shared State
// ============================================================================

impl ChannelRegistry {
    /// The configuration.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.context.settings
    }

    /// The codec shared by all channels; register transforms here.
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.inner.context.codec
    }

    /// Handlers fired for every channel, after the channel's own.
    #[inline]
    #[must_use]
    pub fn common_handlers(&self) -> &ChannelHandlers {
        &self.inner.context.common
    }

    /// Installs the receiver of eval commands, replacing any previous one.
    pub fn set_command_handler<H>(&self, handler: H)
    where
        H: CommandHandler + 'static,
    {
        *self.inner.context.command_handler.write() = Some(Arc::new(handler));
    }

    /// Removes the command handler; eval commands are then discarded.
    pub fn clear_command_handler(&self) {
        self.inner.context.command_handler.write().take();
    }

    /// Registers a connectivity alert handler.
    pub fn on_alert<F>(&self, f: F) -> Handler<AlertSignal>
    where
        F: Fn(&AlertSignal) + Send + Sync + 'static,
    {
        let handler: Handler<AlertSignal> = Arc::new(f);
        self.inner.context.alert.handlers().add(Arc::clone(&handler));
        handler
    }

    /// Returns `true` while a disconnect banner should be showing.
    #[inline]
    #[must_use]
    pub fn banner_visible(&self) -> bool {
        self.inner.context.alert.banner_visible()
    }

    /// Returns `true` if no channel has tripped the connectivity alert.
    #[must_use]
    pub fn all_connected(&self) -> bool {
        alert::all_connected(self.inner.channels.read().iter().map(Channel::is_disconnected))
    }
}

// ============================================================================
// ChannelRegistry - Channels
// ============================================================================

impl ChannelRegistry {
    /// Creates and opens a channel for `route`.
    ///
    /// Returns the existing channel if `route` is already registered.
    pub fn init_channel(&self, route: impl Into<Route>) -> Channel {
        let route = route.into();

        let channel = {
            let mut index = self.inner.index.write();
            if let Some(&position) = index.get(&route) {
                if let Some(existing) = self.inner.channels.read().get(position) {
                    return existing.clone();
                }
            }

            let channel = Channel::new(
                route.clone(),
                Arc::clone(&self.inner.context),
                Arc::downgrade(&self.inner),
            );
            let mut channels = self.inner.channels.write();
            index.insert(route.clone(), channels.len());
            channels.push(channel.clone());
            channel
        };

        if self.settings().is_dev() {
            info!(route = %route, "Channel initialized");
        } else {
            debug!(route = %route, "Channel initialized");
        }
        channel.start();
        channel
    }

    /// Creates and opens the channel for the configured default route.
    pub fn init_default_channel(&self) -> Channel {
        self.init_channel(self.settings().default_route())
    }

    /// Looks up a channel by route, falling back to the first registered
    /// channel.
    #[must_use]
    pub fn find_by_route(&self, route: &str) -> Option<Channel> {
        self.find_exact(route).or_else(|| self.inner.first())
    }

    /// Looks up a channel by route, without fallback.
    #[must_use]
    pub fn find_exact(&self, route: &str) -> Option<Channel> {
        self.inner.find_exact(route)
    }

    /// The application channel: the default route's, else the first.
    #[must_use]
    pub fn find_app(&self) -> Option<Channel> {
        self.find_by_route(&self.settings().default_route)
    }

    /// All channels in registration order.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.inner.channels.read().clone()
    }

    /// Number of registered channels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Returns `true` if no channel is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.channels.read().is_empty()
    }
}

// ============================================================================
// ChannelRegistry - Fan-out
// ============================================================================

impl ChannelRegistry {
    /// Sends `message` on every channel, each with its own route.
    ///
    /// Returns one result per channel, in registration order.
    pub async fn broadcast(&self, message: &str, payload: Value) -> Vec<Result<()>> {
        let channels = self.channels();
        let sends = channels
            .iter()
            .map(|channel| channel.send(message, payload.clone()));
        join_all(sends).await
    }

    /// Tears every channel down, as on page unload.
    ///
    /// With autosubscribe on, each channel unsubscribes first. Pending
    /// timers are cancelled before any transport closes.
    pub fn shutdown(&self) {
        if self.settings().is_dev() {
            info!("Preparing to unload");
        }

        let autosubscribe = self.settings().autosubscribe;
        for channel in self.channels() {
            if autosubscribe {
                channel.unsubscribe();
            } else {
                channel.close();
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::config::TransportKind;
    use crate::transport::{EventSender, Transport, TransportEvent};

    /// Transport that opens immediately and records frames.
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<String>>>,
        events: EventSender,
    }

    impl Transport for RecordingTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Websocket
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn send(&self, text: String) -> bool {
            self.sent.lock().push(text);
            true
        }

        fn close(&self) {
            let _ = self.events.send(TransportEvent::Close);
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Connector for RecordingConnector {
        fn connect(&self, events: EventSender) -> Result<Arc<dyn Transport>> {
            let _ = events.send(TransportEvent::Open);
            Ok(Arc::new(RecordingTransport {
                sent: Arc::clone(&self.sent),
                events,
            }))
        }
    }

    fn registry() -> (ChannelRegistry, Arc<Mutex<Vec<String>>>) {
        let connector = RecordingConnector::default();
        let sent = Arc::clone(&connector.sent);
        let settings = Settings::default().with_autosubscribe(false);
        let registry = ChannelRegistry::with_connector(settings, Arc::new(connector)).unwrap();
        (registry, sent)
    }

    #[tokio::test]
    async fn test_find_by_route_falls_back_to_first() {
        let (registry, _) = registry();
        let a = registry.init_channel("a");
        let b = registry.init_channel("b");

        assert!(registry.find_by_route("a").unwrap().ptr_eq(&a));
        assert!(registry.find_by_route("b").unwrap().ptr_eq(&b));
        assert!(registry.find_by_route("missing").unwrap().ptr_eq(&a));
        assert!(registry.find_exact("missing").is_none());
        assert!(registry.find_app().unwrap().ptr_eq(&a));
    }

    #[tokio::test]
    async fn test_find_on_empty_registry() {
        let (registry, _) = registry();
        assert!(registry.is_empty());
        assert!(registry.find_by_route("a").is_none());
        assert!(registry.find_app().is_none());
        assert!(registry.all_connected());
    }

    #[tokio::test]
    async fn test_init_channel_is_idempotent_per_route() {
        let (registry, _) = registry();
        let first = registry.init_channel("a");
        let second = registry.init_channel("a");
        assert!(first.ptr_eq(&second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_default_channel_is_app() {
        let (registry, _) = registry();
        registry.init_channel("other");
        let default = registry.init_default_channel();
        assert_eq!(default.route(), "__");
        assert!(registry.find_app().unwrap().ptr_eq(&default));
    }

    #[tokio::test]
    async fn test_broadcast_sends_once_per_channel() {
        let (registry, sent) = registry();
        registry.init_channel("a");
        registry.init_channel("b");
        registry.init_channel("c");

        let results = registry.broadcast("refresh", Value::Null).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_ok));

        let sent = sent.lock();
        assert_eq!(sent.len(), 3);
        for route in ["a", "b", "c"] {
            let expected = format!(r#"{{"channel":"{route}","message":"refresh","payload":null}}"#);
            assert_eq!(sent.iter().filter(|f| **f == expected).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_send_message_to_other_route_uses_its_channel() {
        let (registry, sent) = registry();
        let a = registry.init_channel("a");
        registry.init_channel("b");

        a.send_message_to("b", "ping", Value::from(1)).await.unwrap();
        assert_eq!(
            sent.lock().as_slice(),
            [r#"{"channel":"b","message":"ping","payload":1}"#]
        );

        let missing = a.send_message_to("nope", "ping", Value::from(1)).await;
        assert!(matches!(missing, Err(crate::Error::RouteNotFound { .. })));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = Settings::default();
        settings.timeout_ms = 0;
        let result = ChannelRegistry::with_connector(settings, Arc::new(RecordingConnector::default()));
        assert!(result.is_err());
    }
}
