//! Envelope encoding and frame decoding.
//!
//! Outbound payloads go through the *serializer* pipeline before JSON
//! encoding; inbound JSON frames go through the *reviver* pipeline after
//! parsing. Both pipelines are ordered lists of named key/value transforms
//! applied by sequential reduction.
//!
//! # Frame Classification
//!
//! After trimming, an inbound text frame is classified in this order:
//!
//! | Check | Outcome |
//! |-------|---------|
//! | starts with the base64 marker | marker stripped, remainder base64-decoded, then re-classified below |
//! | starts with the eval command prefix | [`Decoded::Command`] |
//! | equals [`SUBSCRIPTION_OK`] | [`Decoded::SubscriptionOk`] |
//! | `{ ... }` | [`Decoded::Json`] (revived) |
//! | anything else | [`Decoded::Text`] |
//!
//! # Built-in Transforms
//!
//! | Value | Wire sentinel |
//! |-------|---------------|
//! | `undefined` | `"__undefined__"` |
//! | `NaN` | `"__nan__"` |
//! | `+Infinity` | `"__inf__"` |
//! | `-Infinity` | `"__neginf__"` |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::identifiers::Route;

use super::envelope::{Envelope, WireEnvelope};
use super::value::Value;

// ============================================================================
// Constants
// ============================================================================

/// Acknowledgement text the server sends after a successful subscribe.
pub const SUBSCRIPTION_OK: &str = "Subscription: OK";

/// Wire sentinel for `undefined`.
pub const UNDEFINED_SENTINEL: &str = "__undefined__";

/// Wire sentinel for `NaN`.
pub const NAN_SENTINEL: &str = "__nan__";

/// Wire sentinel for `+Infinity`.
pub const INFINITY_SENTINEL: &str = "__inf__";

/// Wire sentinel for `-Infinity`.
pub const NEG_INFINITY_SENTINEL: &str = "__neginf__";

// ============================================================================
// Types
// ============================================================================

/// Transform function: receives the member key and the current value,
/// returns the replacement. Array items are keyed by index; the decoded
/// frame root is keyed `""` and the encoded payload root `"payload"`.
pub type TransformFn = dyn Fn(&str, Value) -> Value + Send + Sync;

// ============================================================================
// Transform
// ============================================================================

/// A named, pure value transform.
///
/// The name is the identity used for idempotent registration.
#[derive(Clone)]
pub struct Transform {
    name: Cow<'static, str>,
    func: Arc<TransformFn>,
}

impl Transform {
    /// Creates a named transform.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the transform's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the transform.
    #[inline]
    pub fn apply(&self, key: &str, value: Value) -> Value {
        (self.func)(key, value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ordered transform list; appending an already-present name is a no-op.
#[derive(Debug, Default)]
pub struct Pipeline {
    transforms: RwLock<Vec<Transform>>,
}

impl Pipeline {
    /// Creates a pipeline from an initial list.
    #[must_use]
    pub fn with(transforms: Vec<Transform>) -> Self {
        Self {
            transforms: RwLock::new(transforms),
        }
    }

    /// Appends a transform; returns `false` if one with the same name exists.
    pub fn append(&self, transform: Transform) -> bool {
        let mut transforms = self.transforms.write();
        if transforms.iter().any(|t| t.name == transform.name) {
            return false;
        }
        transforms.push(transform);
        true
    }

    /// Number of transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.read().len()
    }

    /// Returns `true` if the pipeline has no transforms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.read().is_empty()
    }

    /// Runs every transform in order on one key/value pair.
    fn reduce(transforms: &[Transform], key: &str, value: Value) -> Value {
        transforms.iter().fold(value, |acc, t| t.apply(key, acc))
    }

    /// Tree walk matching a JSON reviver: children first, then the holder.
    fn revive(&self, value: Value) -> Value {
        let transforms = self.transforms.read();
        revive_walk(&transforms, "", value)
    }

    /// Tree walk matching a JSON replacer: holder first, then its children.
    fn serialize(&self, key: &str, value: Value) -> Value {
        let transforms = self.transforms.read();
        serialize_walk(&transforms, key, value)
    }
}

fn revive_walk(transforms: &[Transform], key: &str, value: Value) -> Value {
    let value = match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let revived = revive_walk(transforms, &k, v);
                    (k, revived)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| revive_walk(transforms, &i.to_string(), v))
                .collect(),
        ),
        other => other,
    };
    Pipeline::reduce(transforms, key, value)
}

fn serialize_walk(transforms: &[Transform], key: &str, value: Value) -> Value {
    match Pipeline::reduce(transforms, key, value) {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let serialized = serialize_walk(transforms, &k, v);
                    (k, serialized)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| serialize_walk(transforms, &i.to_string(), v))
                .collect(),
        ),
        other => other,
    }
}

// ============================================================================
// Built-in Transforms
// ============================================================================

/// Reviver mapping the wire sentinels back to their values.
#[must_use]
pub fn sentinel_reviver() -> Transform {
    Transform::new("sentinels", |_, value| match value {
        Value::String(s) => match s.as_str() {
            UNDEFINED_SENTINEL => Value::Undefined,
            NAN_SENTINEL => Value::Number(f64::NAN),
            INFINITY_SENTINEL => Value::Number(f64::INFINITY),
            NEG_INFINITY_SENTINEL => Value::Number(f64::NEG_INFINITY),
            _ => Value::String(s),
        },
        other => other,
    })
}

/// Serializer mapping values JSON cannot carry to wire sentinels.
#[must_use]
pub fn sentinel_serializer() -> Transform {
    Transform::new("sentinels", |_, value| match value {
        Value::Undefined => Value::String(UNDEFINED_SENTINEL.to_string()),
        Value::Number(n) if n.is_nan() => Value::String(NAN_SENTINEL.to_string()),
        Value::Number(n) if n == f64::INFINITY => Value::String(INFINITY_SENTINEL.to_string()),
        Value::Number(n) if n == f64::NEG_INFINITY => {
            Value::String(NEG_INFINITY_SENTINEL.to_string())
        }
        other => other,
    })
}

// ============================================================================
// Decoded
// ============================================================================

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Server-pushed command; the text after the eval prefix, trimmed.
    Command(String),
    /// Subscription acknowledgement.
    SubscriptionOk,
    /// Structured JSON after reviving.
    Json(Value),
    /// Opaque text.
    Text(String),
}

impl Decoded {
    /// Returns the envelope carried by a JSON frame, if any.
    #[must_use]
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Self::Json(value) => Envelope::from_value(value),
            _ => None,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Encoder/decoder shared by every channel of a registry.
#[derive(Debug)]
pub struct Codec {
    eval_command: String,
    base64_marker: String,
    revivers: Pipeline,
    serializers: Pipeline,
}

impl Codec {
    /// Creates a codec with the built-in sentinel transforms.
    #[must_use]
    pub fn new(eval_command: impl Into<String>, base64_marker: impl Into<String>) -> Self {
        Self {
            eval_command: eval_command.into(),
            base64_marker: base64_marker.into(),
            revivers: Pipeline::with(vec![sentinel_reviver()]),
            serializers: Pipeline::with(vec![sentinel_serializer()]),
        }
    }

    /// Creates a codec using the prefixes configured in `settings`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.eval_command, &settings.base64_marker)
    }

    /// Appends a reviver; returns `false` if its name is already registered.
    pub fn add_reviver(&self, transform: Transform) -> bool {
        self.revivers.append(transform)
    }

    /// Appends a serializer; returns `false` if its name is already registered.
    pub fn add_serializer(&self, transform: Transform) -> bool {
        self.serializers.append(transform)
    }

    /// Reviver pipeline.
    #[inline]
    #[must_use]
    pub fn revivers(&self) -> &Pipeline {
        &self.revivers
    }

    /// Serializer pipeline.
    #[inline]
    #[must_use]
    pub fn serializers(&self) -> &Pipeline {
        &self.serializers
    }

    /// Encodes an envelope as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self, channel: &Route, message: &str, payload: &Value) -> Result<String> {
        let payload = self
            .serializers
            .serialize("payload", payload.clone())
            .to_json();
        let wire = WireEnvelope {
            channel: channel.as_str(),
            message,
            payload,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Encodes an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    #[inline]
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<String> {
        self.encode(&envelope.channel, &envelope.message, &envelope.payload)
    }

    /// Classifies and decodes one inbound frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Base64`] / [`Error::Decode`] for a malformed base64 frame
    /// - [`Error::Decode`] for a `{ ... }` frame that is not valid JSON
    pub fn decode(&self, raw: &str) -> Result<Decoded> {
        let trimmed = raw.trim();

        let unwrapped;
        let text = match trimmed.strip_prefix(self.base64_marker.as_str()) {
            Some(encoded) => {
                let bytes = Base64Standard.decode(encoded.trim())?;
                unwrapped = String::from_utf8(bytes)
                    .map_err(|e| Error::decode(format!("base64 frame is not UTF-8: {e}")))?;
                trace!(len = unwrapped.len(), "Unwrapped base64 frame");
                unwrapped.trim()
            }
            None => trimmed,
        };

        if let Some(command) = text.strip_prefix(self.eval_command.as_str()) {
            return Ok(Decoded::Command(command.trim().to_string()));
        }

        if text == SUBSCRIPTION_OK {
            return Ok(Decoded::SubscriptionOk);
        }

        if text.starts_with('{') && text.ends_with('}') {
            let json: JsonValue = serde_json::from_str(text)
                .map_err(|e| Error::decode(format!("malformed JSON frame: {e}")))?;
            return Ok(Decoded::Json(self.revivers.revive(Value::from(json))));
        }

        Ok(Decoded::Text(text.to_string()))
    }

    /// Runs an already parsed JSON value through the reviver pipeline.
    #[must_use]
    pub fn revive(&self, json: JsonValue) -> Value {
        self.revivers.revive(Value::from(json))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
