//! Outbound messages and the queued send path.

use std::sync::atomic::Ordering;

use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::Route;
use crate::protocol::Value;

use super::core::Channel;

impl Channel {
    /// Sends `message` with `payload` on this channel's route.
    ///
    /// When the transport is not ready, a message with a non-empty payload
    /// is retried every `timeout_ms` up to `max_send_attempts` times; a
    /// message with an empty payload is dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] after [`Channel::unsubscribe`] or [`Channel::close`]
    /// - [`Error::SendTimeout`] if the transport never became ready
    /// - [`Error::Json`] if the envelope cannot be encoded
    pub async fn send(&self, message: &str, payload: Value) -> Result<()> {
        if self.is_torn_down() {
            return Err(Error::ConnectionClosed);
        }

        let frame = self
            .inner
            .context
            .codec
            .encode(&self.inner.route, message, &payload)?;

        if self.try_send(frame.clone()) {
            trace!(route = %self.inner.route, message, "Frame sent");
            return Ok(());
        }

        if payload.is_empty() {
            debug!(route = %self.inner.route, message, "Transport not ready, empty message dropped");
            return Ok(());
        }

        let attempts = self.settings().max_send_attempts;
        let interval = self.settings().poll_interval();
        for attempt in 1..=attempts {
            sleep(interval).await;
            if self.is_torn_down() {
                return Err(Error::ConnectionClosed);
            }
            if self.try_send(frame.clone()) {
                debug!(route = %self.inner.route, message, attempt, "Queued frame sent");
                return Ok(());
            }
        }

        warn!(route = %self.inner.route, message, attempts, "Send timed out");
        Err(Error::send_timeout(self.inner.route.clone(), message, attempts))
    }

    /// Sends on `route`.
    ///
    /// Every envelope carries the route of the channel that sends it, so a
    /// foreign route is delegated to the registered channel for that route.
    ///
    /// # Errors
    ///
    /// - [`Error::RouteNotFound`] if no channel is registered for `route`
    /// - any error of [`Channel::send`]
    pub async fn send_message_to(&self, route: &str, message: &str, payload: Value) -> Result<()> {
        if self.inner.route == route {
            return self.send(message, payload).await;
        }

        let target = self
            .inner
            .registry
            .upgrade()
            .and_then(|registry| registry.find_exact(route));

        match target {
            Some(channel) => channel.send(message, payload).await,
            None => Err(Error::route_not_found(Route::new(route))),
        }
    }

    fn is_torn_down(&self) -> bool {
        self.inner.suppress_reconnect.load(Ordering::SeqCst) && self.state().is_terminal()
    }

    /// Hands `frame` to the transport if it is ready.
    pub(crate) fn try_send(&self, frame: String) -> bool {
        match self.transport() {
            Some(transport) if transport.is_ready() => transport.send(frame),
            _ => false,
        }
    }
}
