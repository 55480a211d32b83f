//! Transport lifecycle: connect, event pump, close and reconnect.
//!
//! Every connect bumps the channel's generation. The event pump of a
//! superseded transport exits on its next event, and timers compare the
//! generation they captured before acting.

use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{EventReceiver, TransportEvent};

use super::core::Channel;
use super::handlers::MessageEvent;
use super::state::ChannelState;

// ============================================================================
// Channel - Connect
// ============================================================================

impl Channel {
    /// Opens the first transport. Failures are reported, not returned.
    pub(crate) fn start(&self) {
        if let Err(e) = self.connect() {
            self.on_connect_failed(e);
        }
    }

    /// Replaces the transport with a fresh one.
    ///
    /// Cancels any pending reconnect and re-enables automatic reconnects
    /// after an earlier [`Channel::unsubscribe`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connector cannot build a transport.
    pub fn reconnect(&self) -> Result<()> {
        self.inner.suppress_reconnect.store(false, Ordering::SeqCst);
        self.abort_timers();
        self.diag("Reconnecting");
        self.connect().inspect_err(|_| self.set_state(ChannelState::Disconnected))
    }

    fn connect(&self) -> Result<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ChannelState::Connecting);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = match self.inner.context.connector.connect(events_tx) {
            Ok(transport) => transport,
            Err(e) => {
                // The old pump is already stale; its transport must go too.
                if let Some(previous) = self.inner.transport.lock().take() {
                    previous.close();
                }
                return Err(e);
            }
        };
        debug!(
            route = %self.inner.route,
            generation,
            kind = ?transport.kind(),
            "Transport opening"
        );

        let previous = self.inner.transport.lock().replace(transport);
        if let Some(previous) = previous {
            previous.close();
        }

        tokio::spawn(self.clone().pump(generation, events_rx));
        Ok(())
    }

    fn on_connect_failed(&self, error: Error) {
        warn!(route = %self.inner.route, error = %error, "Connect failed");
        self.emit_error(error);
        if self.should_reconnect() {
            self.set_state(ChannelState::Reconnecting);
            self.arm_alert();
            self.schedule_reconnect();
        } else {
            self.set_state(ChannelState::Disconnected);
        }
    }

    fn should_reconnect(&self) -> bool {
        self.settings().autosubscribe && !self.inner.suppress_reconnect.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Channel - Event Pump
// ============================================================================

impl Channel {
    async fn pump(self, generation: u64, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                trace!(route = %self.inner.route, generation, "Stale transport event dropped");
                break;
            }

            match event {
                TransportEvent::Open => self.on_transport_open(generation),
                TransportEvent::Message(raw) => self.on_transport_message(generation, raw),
                TransportEvent::Error(error) => {
                    debug!(route = %self.inner.route, error = %error, "Transport error");
                    self.emit_error(error);
                }
                TransportEvent::Close => {
                    self.on_transport_close();
                    break;
                }
            }
        }
        trace!(route = %self.inner.route, generation, "Event pump terminated");
    }

    fn on_transport_open(&self, generation: u64) {
        if self.state() == ChannelState::Closing {
            trace!(route = %self.inner.route, "Open after teardown ignored");
            return;
        }

        self.set_state(ChannelState::Open);
        self.inner.backoff.lock().reset();
        self.diag("Transport open");
        self.emit(|h| &h.open, &self.inner.route);

        if self.should_reconnect() {
            self.start_subscribe(generation);
        }
    }

    fn on_transport_message(&self, generation: u64, raw: String) {
        *self.inner.last_message_at.lock() = Some(Instant::now());

        self.emit(
            |h| &h.message,
            &MessageEvent {
                route: self.inner.route.clone(),
                raw: raw.clone(),
            },
        );
        self.dispatch(generation, &raw);
    }

    fn on_transport_close(&self) {
        self.inner.transport.lock().take();
        self.diag("Transport closed");
        self.emit(|h| &h.close, &self.inner.route);

        if self.state() == ChannelState::Closing || !self.should_reconnect() {
            self.set_state(ChannelState::Disconnected);
            return;
        }

        self.set_state(ChannelState::Reconnecting);
        self.arm_alert();
        self.schedule_reconnect();
    }
}

// ============================================================================
// Channel - Timers
// ============================================================================

impl Channel {
    /// Schedules one reconnect after the next backoff delay.
    ///
    /// At most one reconnect is pending per channel.
    fn schedule_reconnect(&self) {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            trace!(route = %self.inner.route, "Reconnect already pending");
            return;
        }

        let delay = self.inner.backoff.lock().next_delay();
        debug!(
            route = %self.inner.route,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        let channel = self.clone();
        self.spawn_timer(async move {
            sleep(delay).await;
            channel.inner.reconnecting.store(false, Ordering::SeqCst);
            if !channel.should_reconnect() {
                return;
            }
            channel.diag("Attempting to reconnect");
            channel.start();
        });
    }

    /// Trips the connectivity alert unless the channel is subscribed again
    /// within the alert timeout.
    ///
    /// One timer covers an outage across reconnect attempts; a subscription
    /// acknowledgement cancels it, so the next close starts a fresh one.
    pub(crate) fn arm_alert(&self) {
        let mut slot = self.inner.alert_timer.lock();
        if self.inner.alert_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let timeout = self.settings().alert_timeout();
        let channel = self.clone();
        let timer = tokio::spawn(async move {
            sleep(timeout).await;
            channel.inner.alert_timer.lock().take();
            channel.inner.alert_pending.store(false, Ordering::SeqCst);
            if channel.inner.suppress_reconnect.load(Ordering::SeqCst) || channel.is_subscribed() {
                return;
            }
            channel.inner.alert_triggered.store(true, Ordering::SeqCst);
            channel.inner.context.alert.raise(&channel.inner.route);
        });
        *slot = Some(timer.abort_handle());
    }
}
