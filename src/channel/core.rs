//! Core Channel struct, shared context and accessors.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::alert::AlertState;
use crate::backoff::Backoff;
use crate::config::Settings;
use crate::error::Error;
use crate::identifiers::Route;
use crate::protocol::Codec;
use crate::registry::RegistryInner;
use crate::transport::{Connector, Transport};

use super::handlers::{ChannelHandlers, CommandHandler, ErrorEvent, HandlerList};
use super::state::ChannelState;

// ============================================================================
// Types
// ============================================================================

/// State shared by every channel of one registry.
pub(crate) struct ChannelContext {
    /// Configuration.
    pub settings: Arc<Settings>,
    /// Frame codec.
    pub codec: Arc<Codec>,
    /// Opens a transport on every (re)connect.
    pub connector: Arc<dyn Connector>,
    /// Registry-wide handlers, fired after each channel's own.
    pub common: ChannelHandlers,
    /// Receiver of eval commands.
    pub command_handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    /// Page-wide connectivity alert.
    pub alert: AlertState,
}

impl ChannelContext {
    pub(crate) fn new(settings: Arc<Settings>, connector: Arc<dyn Connector>) -> Self {
        Self {
            codec: Arc::new(Codec::from_settings(&settings)),
            alert: AlertState::new(&settings),
            settings,
            connector,
            common: ChannelHandlers::default(),
            command_handler: RwLock::new(None),
        }
    }
}

/// Internal shared state for a channel.
pub(crate) struct ChannelInner {
    /// Route carried by every envelope this channel sends.
    pub route: Route,
    /// Registry-wide context.
    pub context: Arc<ChannelContext>,
    /// Back-reference for cross-channel sends.
    pub registry: Weak<RegistryInner>,
    /// This channel's handlers.
    pub handlers: ChannelHandlers,
    /// Lifecycle state.
    pub state: Mutex<ChannelState>,
    /// Current transport; replaced wholesale on reconnect.
    pub transport: Mutex<Option<Arc<dyn Transport>>>,
    /// Bumped on every connect. Timers and event pumps of an older
    /// generation must not act.
    pub generation: AtomicU64,
    /// Generation whose subscription was acknowledged (0 = none).
    pub subscribed_generation: AtomicU64,
    /// Pending timers, aborted on teardown.
    pub timers: Mutex<Vec<AbortHandle>>,
    /// A reconnect timer is pending.
    pub reconnecting: AtomicBool,
    /// An alert timer is pending.
    pub alert_pending: AtomicBool,
    /// The pending alert timer; cancelled by a subscription acknowledgement.
    pub alert_timer: Mutex<Option<AbortHandle>>,
    /// Set by unsubscribe/close; no reconnect may follow.
    pub suppress_reconnect: AtomicBool,
    /// This channel failed to resubscribe in time.
    pub alert_triggered: AtomicBool,
    /// Arrival time of the last inbound frame.
    pub last_message_at: Mutex<Option<Instant>>,
    /// Reconnect delays.
    pub backoff: Mutex<Backoff>,
}

// ============================================================================
// Channel
// ============================================================================

/// A logical subscription on one route.
///
/// Cheap to clone; clones share state. Created through
/// [`ChannelRegistry::init_channel`](crate::ChannelRegistry::init_channel).
#[derive(Clone)]
pub struct Channel {
    pub(crate) inner: Arc<ChannelInner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("route", &self.inner.route)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Creates an unconnected channel.
    pub(crate) fn new(
        route: Route,
        context: Arc<ChannelContext>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        let backoff = Backoff::from_settings(&context.settings);
        Self {
            inner: Arc::new(ChannelInner {
                route,
                context,
                registry,
                handlers: ChannelHandlers::default(),
                state: Mutex::new(ChannelState::Disconnected),
                transport: Mutex::new(None),
                generation: AtomicU64::new(0),
                subscribed_generation: AtomicU64::new(0),
                timers: Mutex::new(Vec::new()),
                reconnecting: AtomicBool::new(false),
                alert_pending: AtomicBool::new(false),
                alert_timer: Mutex::new(None),
                suppress_reconnect: AtomicBool::new(false),
                alert_triggered: AtomicBool::new(false),
                last_message_at: Mutex::new(None),
                backoff: Mutex::new(backoff),
            }),
        }
    }
}

// ============================================================================
// Channel - Accessors
// ============================================================================

impl Channel {
    /// Returns the route.
    #[inline]
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.inner.route
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    /// Returns `true` once the server acknowledged the subscription.
    #[inline]
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state() == ChannelState::Subscribed
    }

    /// Returns `true` if this channel has tripped the connectivity alert.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.inner.alert_triggered.load(Ordering::SeqCst)
    }

    /// Returns `true` if the current transport accepts frames.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.transport().is_some_and(|t| t.is_ready())
    }

    /// When the last inbound frame arrived.
    #[must_use]
    pub fn last_message_at(&self) -> Option<Instant> {
        *self.inner.last_message_at.lock()
    }

    /// This channel's handler lists.
    #[inline]
    #[must_use]
    pub fn handlers(&self) -> &ChannelHandlers {
        &self.inner.handlers
    }

    /// Number of transports opened so far.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Returns `true` if both handles refer to the same channel.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Channel - Internal
// ============================================================================

impl Channel {
    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.context.settings
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.lock().clone()
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), state);
        if previous != state {
            trace!(route = %self.inner.route, from = %previous, to = %state, "State change");
        }
    }

    /// Returns `true` if `generation` is still the live one.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Spawns a cancellable timer task.
    pub(crate) fn spawn_timer<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future).abort_handle();
        let mut timers = self.inner.timers.lock();
        timers.retain(|t| !t.is_finished());
        timers.push(handle);
    }

    /// Aborts every pending timer.
    pub(crate) fn abort_timers(&self) {
        let timers = std::mem::take(&mut *self.inner.timers.lock());
        for timer in &timers {
            timer.abort();
        }
        self.inner.reconnecting.store(false, Ordering::SeqCst);
        self.cancel_alert();
        if !timers.is_empty() {
            trace!(route = %self.inner.route, count = timers.len(), "Timers aborted");
        }
    }

    /// Cancels the pending alert timer, if any.
    pub(crate) fn cancel_alert(&self) {
        if let Some(timer) = self.inner.alert_timer.lock().take() {
            timer.abort();
        }
        self.inner.alert_pending.store(false, Ordering::SeqCst);
    }

    /// Fires the channel's handlers, then the registry-wide ones.
    pub(crate) fn emit<T>(&self, select: impl Fn(&ChannelHandlers) -> &HandlerList<T>, event: &T) {
        select(&self.inner.handlers).emit(event);
        select(&self.inner.context.common).emit(event);
    }

    pub(crate) fn emit_error(&self, error: Error) {
        self.emit(
            |h| &h.error,
            &ErrorEvent {
                route: self.inner.route.clone(),
                error,
            },
        );
    }

    /// Logs lifecycle progress; at `info` in the dev environment.
    pub(crate) fn diag(&self, message: &str) {
        if self.settings().is_dev() {
            info!(route = %self.inner.route, "{message}");
        } else {
            debug!(route = %self.inner.route, "{message}");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::error::Result;
    use crate::transport::EventSender;

    struct NeverConnects;

    impl Connector for NeverConnects {
        fn connect(&self, _events: EventSender) -> Result<Arc<dyn Transport>> {
            Err(Error::connection("offline"))
        }
    }

    fn channel() -> Channel {
        let context = ChannelContext::new(Arc::new(Settings::default()), Arc::new(NeverConnects));
        Channel::new(Route::new("app"), Arc::new(context), Weak::new())
    }

    #[test]
    fn test_new_channel_is_idle() {
        let channel = channel();
        assert_eq!(channel.route(), "app");
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!channel.is_ready());
        assert!(!channel.is_subscribed());
        assert!(!channel.is_disconnected());
        assert!(channel.last_message_at().is_none());
        assert_eq!(channel.generation(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let a = channel();
        let b = a.clone();
        a.set_state(ChannelState::Open);
        assert_eq!(b.state(), ChannelState::Open);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&channel()));
    }

    #[test]
    fn test_emit_fires_channel_then_common() {
        let channel = channel();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        channel
            .inner
            .context
            .common
            .on_open(move |_| sink.lock().push("common"));
        let sink = Arc::clone(&order);
        channel.handlers().on_open(move |_| sink.lock().push("channel"));

        channel.emit(|h| &h.open, channel.route());
        assert_eq!(*order.lock(), vec!["channel", "common"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_timers_cancels_pending_work() {
        let channel = channel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        channel.spawn_timer(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        });

        channel.abort_timers();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
