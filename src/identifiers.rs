//! Type-safe identifier wrappers.
//!
//! Newtype wrappers prevent mixing a channel route with an arbitrary
//! message name or a polling client id with a status code.
//!
//! | Type | Wraps | Purpose |
//! |------|-------|---------|
//! | [`Route`] | `String` | Logical channel route (`channel` envelope key) |
//! | [`ClientId`] | `u32` | Per-client polling correlation id (`wtclient`) |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Route
// ============================================================================

/// A logical channel route.
///
/// Equivalent to an action/controller pair on the server. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(Arc<str>);

impl Route {
    /// Creates a route from any string.
    #[inline]
    #[must_use]
    pub fn new(route: impl AsRef<str>) -> Self {
        Self(Arc::from(route.as_ref()))
    }

    /// Returns the route as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Route {
    #[inline]
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Route {
    #[inline]
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for Route {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Route {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Route {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Route {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

// ============================================================================
// ClientId
// ============================================================================

/// Random per-client identifier for the polling transport.
///
/// Generated once per connector from the thread-local CSPRNG and sent as
/// the `wtclient` query parameter on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u32);

impl ClientId {
    /// Generates a fresh random client id.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::rng().random())
    }

    /// Creates a client id from a known value.
    #[inline]
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_display_and_eq() {
        let route = Route::new("/dashboard");
        assert_eq!(route.to_string(), "/dashboard");
        assert_eq!(route, "/dashboard");
        assert_eq!(route, Route::from(String::from("/dashboard")));
    }

    #[test]
    fn test_route_serde_is_transparent() {
        let route = Route::new("app");
        assert_eq!(serde_json::to_string(&route).unwrap(), "\"app\"");
        let back: Route = serde_json::from_str("\"app\"").unwrap();
        assert_eq!(back, route);
    }

    #[test]
    fn test_client_id_roundtrip() {
        let id = ClientId::from_u32(42);
        assert_eq!(id.as_u32(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_client_ids_differ() {
        let ids: Vec<_> = (0..8).map(|_| ClientId::generate()).collect();
        assert!(ids.windows(2).any(|w| w[0] != w[1]));
    }
}
