//! The `{channel, message, payload}` wire unit.
//!
//! # Format
//!
//! ```json
//! {
//!   "channel": "dashboard",
//!   "message": "update",
//!   "payload": { "count": 3 }
//! }
//! ```
//!
//! Key names and casing are part of the wire contract with the server.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::identifiers::Route;

use super::value::Value;

// ============================================================================
// Envelope
// ============================================================================

/// A decoded or to-be-encoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Logical route; for outbound envelopes always the sending channel's.
    pub channel: Route,
    /// Event name.
    pub message: String,
    /// Arbitrary payload.
    pub payload: Value,
}

impl Envelope {
    /// Creates an envelope.
    #[inline]
    #[must_use]
    pub fn new(channel: Route, message: impl Into<String>, payload: Value) -> Self {
        Self {
            channel,
            message: message.into(),
            payload,
        }
    }

    /// Extracts an envelope from a decoded object.
    ///
    /// Returns `None` unless `channel` and `message` are strings. A missing
    /// payload becomes `undefined`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let channel = value.get("channel")?.as_str()?;
        let message = value.get("message")?.as_str()?;
        let payload = value.get("payload").cloned().unwrap_or_default();

        Some(Self {
            channel: Route::new(channel),
            message: message.to_string(),
            payload,
        })
    }
}

// ============================================================================
// WireEnvelope
// ============================================================================

/// Serialized form; the payload has already been through the serializer pipeline.
#[derive(Debug, Serialize)]
pub(crate) struct WireEnvelope<'a> {
    pub channel: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        let value = Value::object([
            ("channel", Value::from("a")),
            ("message", Value::from("ping")),
            ("payload", Value::from(1)),
        ]);
        let envelope = Envelope::from_value(&value).expect("envelope");
        assert_eq!(envelope.channel, "a");
        assert_eq!(envelope.message, "ping");
        assert_eq!(envelope.payload, Value::from(1));
    }

    #[test]
    fn test_from_value_without_payload() {
        let value = Value::object([("channel", "a"), ("message", "ping")]);
        let envelope = Envelope::from_value(&value).expect("envelope");
        assert!(envelope.payload.is_undefined());
    }

    #[test]
    fn test_from_value_requires_message() {
        let value = Value::object([("channel", "a")]);
        assert!(Envelope::from_value(&value).is_none());
    }

    #[test]
    fn test_wire_key_names() {
        let wire = WireEnvelope {
            channel: "a",
            message: "m",
            payload: Some(JsonValue::Bool(true)),
        };
        assert_eq!(
            serde_json::to_string(&wire).unwrap(),
            r#"{"channel":"a","message":"m","payload":true}"#
        );
    }
}
