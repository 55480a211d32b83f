//! Subscribe handshake and teardown.

use std::sync::atomic::Ordering;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::protocol::Value;

use super::core::Channel;
use super::state::ChannelState;

// ============================================================================
// Channel - Subscribe
// ============================================================================

impl Channel {
    /// Sends the subscribe control message, waiting for transport readiness
    /// up to `max_subscription_trials` times.
    pub(crate) fn start_subscribe(&self, generation: u64) {
        let channel = self.clone();
        self.spawn_timer(async move {
            let trials = channel.settings().max_subscription_trials;
            let interval = channel.settings().poll_interval();

            for trial in 1..=trials {
                if !channel.is_current(generation) {
                    return;
                }
                let subscribe = channel.settings().subscribe_channel.clone();
                if channel.send_control(&subscribe) {
                    channel.diag("Subscription requested");
                    return;
                }
                if trial < trials {
                    channel.diag("Queuing subscription");
                    sleep(interval).await;
                }
            }

            warn!(route = %channel.inner.route, trials, "Subscription could not be sent");
            channel.arm_alert();
        });
    }

    /// Handles the server's subscription acknowledgement.
    ///
    /// Subscription handlers fire once per transport generation, however
    /// many acknowledgements arrive.
    pub(crate) fn on_subscription_ack(&self, generation: u64) {
        if self.state().is_terminal() {
            debug!(route = %self.inner.route, "Acknowledgement after teardown ignored");
            return;
        }
        if self.inner.subscribed_generation.swap(generation, Ordering::SeqCst) == generation {
            debug!(route = %self.inner.route, generation, "Duplicate subscription acknowledgement");
            return;
        }

        self.set_state(ChannelState::Subscribed);
        self.cancel_alert();
        self.inner.alert_triggered.store(false, Ordering::SeqCst);
        self.inner.context.alert.clear(&self.inner.route);
        self.diag("Subscription ready");
        self.emit(|h| &h.subscription, &self.inner.route);
    }
}

// ============================================================================
// Channel - Teardown
// ============================================================================

impl Channel {
    /// Sends the unsubscribe control message and closes the transport.
    ///
    /// Pending reconnect, alert and handshake timers are cancelled first; no
    /// reconnect follows.
    pub fn unsubscribe(&self) {
        self.begin_teardown();
        let unsubscribe = self.settings().unsubscribe_channel.clone();
        if self.send_control(&unsubscribe) {
            self.diag("Unsubscription sent");
        }
        self.close_transport();
    }

    /// Closes the transport without unsubscribing. No reconnect follows.
    pub fn close(&self) {
        self.begin_teardown();
        self.close_transport();
    }

    fn begin_teardown(&self) {
        self.inner.suppress_reconnect.store(true, Ordering::SeqCst);
        self.abort_timers();
        self.set_state(ChannelState::Closing);
    }

    fn close_transport(&self) {
        match self.transport() {
            Some(transport) => transport.close(),
            None => self.set_state(ChannelState::Disconnected),
        }
    }

    /// Sends a control message with an empty payload, without queueing.
    fn send_control(&self, message: &str) -> bool {
        match self
            .inner
            .context
            .codec
            .encode(&self.inner.route, message, &Value::empty_object())
        {
            Ok(frame) => self.try_send(frame),
            Err(e) => {
                warn!(route = %self.inner.route, error = %e, "Failed to encode control message");
                false
            }
        }
    }
}
