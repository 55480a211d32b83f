//! Inbound frame routing.

use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::protocol::{Decoded, Value};

use super::core::Channel;
use super::handlers::ProcessingEvent;

impl Channel {
    /// Decodes one frame and routes it.
    ///
    /// | Outcome | Destination |
    /// |---------|-------------|
    /// | eval command | the registry's [`CommandHandler`](super::CommandHandler) |
    /// | subscription acknowledgement | subscription handlers |
    /// | JSON or text | processing handlers |
    ///
    /// Errors stay confined to the frame: they reach the error handlers and
    /// the connection is left alone.
    pub(crate) fn dispatch(&self, generation: u64, raw: &str) {
        let decoded = match self.inner.context.codec.decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(route = %self.inner.route, error = %e, "Dropping undecodable frame");
                self.emit_error(e);
                return;
            }
        };

        match decoded {
            Decoded::Command(command) => self.run_command(&command),
            Decoded::SubscriptionOk => self.on_subscription_ack(generation),
            Decoded::Json(payload) => self.process(payload),
            Decoded::Text(text) => self.process(Value::String(text)),
        }
    }

    fn run_command(&self, command: &str) {
        let handler = self.inner.context.command_handler.read().clone();
        let Some(handler) = handler else {
            debug!(route = %self.inner.route, "No command handler installed, command discarded");
            return;
        };

        trace!(route = %self.inner.route, len = command.len(), "Running command");
        if let Err(e) = handler.execute(&self.inner.route, command) {
            warn!(route = %self.inner.route, error = %e, "Command failed");
            let error = match e {
                Error::Command { .. } => e,
                other => Error::command(other.to_string()),
            };
            self.emit_error(error);
        }
    }

    fn process(&self, payload: Value) {
        if self.settings().is_dev() {
            info!(route = %self.inner.route, ?payload, "Payload received");
        }
        self.emit(
            |h| &h.processing,
            &ProcessingEvent {
                route: self.inner.route.clone(),
                payload,
            },
        );
    }
}
