//! Payload value model.
//!
//! [`Value`] mirrors what a browser page can put in a payload, which is a
//! superset of JSON: it can also hold `undefined`, `NaN` and the two
//! infinities. The codec pipelines map those onto sentinel strings before
//! anything touches the wire.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as JsonValue};

// ============================================================================
// Constants
// ============================================================================

/// Largest integer an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

// ============================================================================
// Value
// ============================================================================

/// A payload value.
///
/// Numbers are `f64`, matching how the page side sees them. Object keys are
/// kept sorted so that encoding is deterministic.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// JavaScript `undefined`.
    #[default]
    Undefined,
    /// JSON `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number, including `NaN` and `±Infinity`.
    Number(f64),
    /// String.
    String(String),
    /// Array.
    Array(Vec<Value>),
    /// Object.
    Object(BTreeMap<String, Value>),
}

// ============================================================================
// Value - Constructors
// ============================================================================

impl Value {
    /// Builds an object from key/value pairs.
    #[must_use]
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds an empty object.
    #[inline]
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }
}

// ============================================================================
// Value - Accessors
// ============================================================================

impl Value {
    /// Returns `true` for `undefined`.
    #[inline]
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` when the value carries no data.
    ///
    /// `undefined`, `null`, `""`, `[]` and `{}` are empty; every other
    /// scalar counts as a payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Object(map) => map.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Looks up a key of an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number, if this is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

// ============================================================================
// Value - JSON Conversion
// ============================================================================

impl Value {
    /// Converts to a JSON value the way `JSON.stringify` would.
    ///
    /// `undefined` object members are dropped, `undefined` array items and
    /// non-finite numbers become `null`. Returns `None` for a top-level
    /// `undefined`.
    #[must_use]
    pub fn to_json(&self) -> Option<JsonValue> {
        match self {
            Self::Undefined => None,
            Self::Null => Some(JsonValue::Null),
            Self::Bool(b) => Some(JsonValue::Bool(*b)),
            Self::Number(n) => Some(number_to_json(*n)),
            Self::String(s) => Some(JsonValue::String(s.clone())),
            Self::Array(items) => Some(JsonValue::Array(
                items
                    .iter()
                    .map(|item| item.to_json().unwrap_or(JsonValue::Null))
                    .collect(),
            )),
            Self::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    if let Some(json) = value.to_json() {
                        out.insert(key.clone(), json);
                    }
                }
                Some(JsonValue::Object(out))
            }
        }
    }
}

/// Serializes integral numbers without a fractional part.
fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

// ============================================================================
// Value - Trait Implementations
// ============================================================================

impl PartialEq for Value {
    /// Structural equality where `NaN` equals `NaN`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(1.0), Value::Number(f64::NAN));
    }

    #[test]
    fn test_is_empty() {
        assert!(Value::Undefined.is_empty());
        assert!(Value::Null.is_empty());
        assert!(Value::empty_object().is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::from(0).is_empty());
        assert!(!Value::from(false).is_empty());
        assert!(!Value::object([("a", 1)]).is_empty());
    }

    #[test]
    fn test_to_json_drops_undefined_members() {
        let value = Value::object([("a", Value::Undefined), ("b", Value::from(1))]);
        assert_eq!(value.to_json(), Some(json!({"b": 1})));
    }

    #[test]
    fn test_to_json_nulls_undefined_items() {
        let value = Value::Array(vec![Value::Undefined, Value::Number(f64::INFINITY)]);
        assert_eq!(value.to_json(), Some(json!([null, null])));
    }

    #[test]
    fn test_integral_numbers_have_no_fraction() {
        let json = Value::from(3).to_json().unwrap();
        assert_eq!(json.to_string(), "3");
        let json = Value::from(2.5).to_json().unwrap();
        assert_eq!(json.to_string(), "2.5");
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"list": [1, "x", null], "ok": true}));
        assert_eq!(
            value,
            Value::object([
                (
                    "list",
                    Value::Array(vec![Value::from(1), Value::from("x"), Value::Null])
                ),
                ("ok", Value::from(true)),
            ])
        );
    }
}
