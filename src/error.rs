//! Error types for the channel client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webchannels::{Error, Result};
//!
//! async fn example(channel: &Channel) -> Result<()> {
//!     channel.send("refresh", Value::Null).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Request | [`Error::Transport`], [`Error::Timeout`], [`Error::AlreadyRunning`] |
//! | Codec | [`Error::Decode`], [`Error::Command`] |
//! | Channel | [`Error::SendTimeout`], [`Error::RouteNotFound`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Base64`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use base64::DecodeError as Base64Error;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::Route;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when settings are invalid or cannot be parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The channel was closed or unsubscribed.
    ///
    /// Returned when sending after an explicit teardown.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Network-level failure after retries were exhausted.
    ///
    /// Covers status `0` and retryable HTTP statuses.
    #[error("Transport error after {attempts} attempt(s)")]
    Transport {
        /// Number of attempts made.
        attempts: u32,
    },

    /// No response within the configured timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// `start()` was called on a request that is still running.
    #[error("Request already running: {url}")]
    AlreadyRunning {
        /// URL of the outstanding request.
        url: String,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Malformed inbound frame.
    ///
    /// Dispatch of the single frame is abandoned; the connection stays up.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// A server-pushed command was rejected by the command handler.
    #[error("Command error: {message}")]
    Command {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// A queued send exhausted its readiness-poll budget.
    #[error("Send timed out on {route} after {attempts} attempt(s): {message}")]
    SendTimeout {
        /// Route the message was addressed to.
        route: Route,
        /// The message (event) name.
        message: String,
        /// Number of readiness polls performed.
        attempts: u32,
    },

    /// No channel is registered for the route.
    #[error("No channel registered for route: {route}")]
    RouteNotFound {
        /// The missing route.
        route: Route,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Base64 decoding error.
    #[error("Base64 error: {0}")]
    Base64(#[from] Base64Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(attempts: u32) -> Self {
        Self::Transport { attempts }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an already-running error.
    #[inline]
    pub fn already_running(url: impl Into<String>) -> Self {
        Self::AlreadyRunning { url: url.into() }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a command error.
    #[inline]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates a send timeout error.
    #[inline]
    pub fn send_timeout(route: Route, message: impl Into<String>, attempts: u32) -> Self {
        Self::SendTimeout {
            route,
            message: message.into(),
            attempts,
        }
    }

    /// Creates a route not found error.
    #[inline]
    pub fn route_not_found(route: Route) -> Self {
        Self::RouteNotFound { route }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::SendTimeout { .. })
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this error is confined to a single frame.
    ///
    /// Frame errors never tear down the connection.
    #[inline]
    #[must_use]
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Command { .. } | Self::Base64(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::SendTimeout { .. }
                | Self::Transport { .. }
                | Self::Connection { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_send_timeout_display() {
        let err = Error::send_timeout(Route::new("app"), "update", 3);
        assert_eq!(
            err.to_string(),
            "Send timed out on app after 3 attempt(s): update"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::timeout("pull", 1000).is_timeout());
        assert!(Error::send_timeout(Route::new("a"), "m", 1).is_timeout());
        assert!(!Error::transport(3).is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::transport(1).is_connection_error());
        assert!(!Error::decode("x").is_connection_error());
    }

    #[test]
    fn test_frame_errors_are_not_connection_errors() {
        let err = Error::decode("bad json");
        assert!(err.is_frame_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_already_running_is_not_recoverable() {
        let err = Error::already_running("http://host/pull");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("http://host/pull"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
