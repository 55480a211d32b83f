//! Channel client settings.
//!
//! Provides a type-safe replacement for the ambient settings object the
//! web page used to expose. Every field has a default, so a partial JSON
//! object is enough to configure a client.
//!
//! # Example
//!
//! ```ignore
//! use webchannels::Settings;
//!
//! let settings = Settings::from_json(r#"{"websockets_port": 8001, "env": "dev"}"#)?
//!     .with_autosubscribe(true)
//!     .with_default_route("app");
//!
//! assert_eq!(settings.websocket_url()?.as_str(), "ws://127.0.0.1:8001/");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, Route};
use crate::request::ErrorCodes;

// ============================================================================
// Constants
// ============================================================================

/// Default text carried by a raised connectivity alert.
pub const DEFAULT_ALERT_MESSAGE: &str = "Can not reach the server - please reload the page";

// ============================================================================
// TransportKind
// ============================================================================

/// Which transport strategy channels ride on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent full-duplex WebSocket.
    #[default]
    Websocket,
    /// HTTP push/pull long-polling.
    Polling,
}

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment; `Dev` enables verbose diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Development: frame bodies and handshake progress logged at `info`.
    Dev,
    /// Production.
    #[default]
    Prod,
}

// ============================================================================
// Settings
// ============================================================================

/// Configuration consumed by the registry, channels and transports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Socket endpoint
    /// WebSocket scheme (`ws` or `wss`).
    pub websockets_protocol: String,
    /// WebSocket host.
    pub websockets_host: String,
    /// WebSocket port; `0` omits the port from the URL.
    pub websockets_port: u16,
    /// Application base path shared by both transports.
    pub base_path: String,
    /// Sub-path of the WebSocket endpoint.
    pub websockets_base_path: String,

    // Polling endpoint
    /// HTTP scheme (`http` or `https`).
    pub http_protocol: String,
    /// HTTP host.
    pub http_host: String,
    /// HTTP port; `0` omits the port from the URL.
    pub http_port: u16,
    /// Route segment under which the polling endpoints live.
    pub webthreads_default_route: String,
    /// Pull endpoint name.
    pub webthreads_pull_route: String,
    /// Push endpoint name.
    pub webthreads_push_route: String,

    /// Transport strategy.
    pub transport: TransportKind,

    // Channel protocol
    /// Route used by [`crate::ChannelRegistry::init_default_channel`].
    pub default_route: String,
    /// Reserved message name of the subscribe control message.
    pub subscribe_channel: String,
    /// Reserved message name of the unsubscribe control message.
    pub unsubscribe_channel: String,
    /// Prefix marking a server-pushed command frame.
    pub eval_command: String,
    /// Prefix marking a base64-wrapped frame.
    pub base64_marker: String,
    /// Subscribe on open and resubscribe after reconnect.
    pub autosubscribe: bool,

    // Timing
    /// Readiness poll interval for queued sends and the subscribe handshake.
    pub timeout_ms: u64,
    /// Initial reconnect delay.
    pub reconnect_delay_ms: u64,
    /// Reconnect delay cap.
    pub reconnect_max_delay_ms: u64,
    /// Consecutive polling failures tolerated before a close is reported.
    pub max_connection_attempts: u32,
    /// Subscribe handshake attempts before the connectivity alert fires.
    pub max_subscription_trials: u32,
    /// Readiness polls performed by a queued send before it fails.
    pub max_send_attempts: u32,
    /// Raise connectivity alerts at all.
    pub show_alert: bool,
    /// How long a close may persist before the alert is raised.
    pub server_gone_alert_timeout_ms: u64,
    /// Text carried by a raised alert.
    pub alert_message: String,

    // Polling requests
    /// Per-attempt request timeout.
    pub request_timeout_ms: u64,
    /// Jitter window added on top of the retry backoff.
    pub request_max_delay_ms: u64,
    /// Attempts per pull or push cycle; `-1` retries forever.
    pub request_max_tries: i32,
    /// HTTP statuses treated as retryable (`"500-599,408"`).
    pub request_error_codes: String,

    /// Deployment environment.
    pub env: Environment,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            websockets_protocol: "ws".to_string(),
            websockets_host: "127.0.0.1".to_string(),
            websockets_port: 0,
            base_path: String::new(),
            websockets_base_path: String::new(),

            http_protocol: "http".to_string(),
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            webthreads_default_route: "__".to_string(),
            webthreads_pull_route: "pull".to_string(),
            webthreads_push_route: "push".to_string(),

            transport: TransportKind::Websocket,

            default_route: "__".to_string(),
            subscribe_channel: "subscribe".to_string(),
            unsubscribe_channel: "unsubscribe".to_string(),
            eval_command: ">eval:".to_string(),
            base64_marker: "__b64__".to_string(),
            autosubscribe: true,

            timeout_ms: 1000,
            reconnect_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            max_connection_attempts: 10,
            max_subscription_trials: 3,
            max_send_attempts: 3,
            show_alert: true,
            server_gone_alert_timeout_ms: 10_000,
            alert_message: DEFAULT_ALERT_MESSAGE.to_string(),

            request_timeout_ms: 60_000,
            request_max_delay_ms: 1000,
            request_max_tries: 1,
            request_error_codes: "500-599".to_string(),

            env: Environment::Prod,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Settings {
    /// Creates settings with all defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings from a JSON object; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not a valid settings object
    /// - [`Error::Config`] if the result fails [`Settings::validate`]
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Settings {
    /// Sets the WebSocket host and port.
    #[inline]
    #[must_use]
    pub fn with_websocket_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.websockets_host = host.into();
        self.websockets_port = port;
        self
    }

    /// Sets the polling host and port.
    #[inline]
    #[must_use]
    pub fn with_http_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.http_host = host.into();
        self.http_port = port;
        self
    }

    /// Sets the application base path.
    #[inline]
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Selects the transport strategy.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the default route.
    #[inline]
    #[must_use]
    pub fn with_default_route(mut self, route: impl Into<String>) -> Self {
        self.default_route = route.into();
        self
    }

    /// Enables or disables autosubscribe.
    #[inline]
    #[must_use]
    pub fn with_autosubscribe(mut self, enabled: bool) -> Self {
        self.autosubscribe = enabled;
        self
    }

    /// Sets the readiness poll interval.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the reconnect backoff bounds.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay_ms = initial.as_millis() as u64;
        self.reconnect_max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Sets the connectivity alert timeout.
    #[inline]
    #[must_use]
    pub fn with_alert_timeout(mut self, timeout: Duration) -> Self {
        self.server_gone_alert_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the environment.
    #[inline]
    #[must_use]
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Settings {
    /// Readiness poll interval.
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Initial reconnect delay.
    #[inline]
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reconnect delay cap.
    #[inline]
    #[must_use]
    pub const fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// Connectivity alert timeout.
    #[inline]
    #[must_use]
    pub const fn alert_timeout(&self) -> Duration {
        Duration::from_millis(self.server_gone_alert_timeout_ms)
    }

    /// Per-attempt polling request timeout.
    #[inline]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The default route.
    #[inline]
    #[must_use]
    pub fn default_route(&self) -> Route {
        Route::new(&self.default_route)
    }

    /// Returns `true` when verbose diagnostics are enabled.
    #[inline]
    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.env == Environment::Dev
    }
}

// ============================================================================
// URL Assembly
// ============================================================================

impl Settings {
    /// Builds the WebSocket endpoint URL.
    ///
    /// Format: `{protocol}://{host}[:{port}]{/base_path}{/websockets_base_path}`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the components do not form a valid URL.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut raw = format!(
            "{}://{}",
            self.websockets_protocol.trim_end_matches(':'),
            self.websockets_host
        );
        if self.websockets_port > 0 {
            raw.push_str(&format!(":{}", self.websockets_port));
        }
        raw.push_str(&join_segment(&self.base_path));
        raw.push_str(&join_segment(&self.websockets_base_path));

        Ok(Url::parse(&raw)?)
    }

    /// Builds a polling endpoint URL carrying the client id.
    ///
    /// Format: `{protocol}://{host}[:{port}]{base_path or /}{route}/{endpoint}?wtclient={id}`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the components do not form a valid URL.
    pub fn polling_url(&self, endpoint: &str, client_id: ClientId) -> Result<Url> {
        let mut raw = format!(
            "{}://{}",
            self.http_protocol.trim_end_matches(':'),
            self.http_host
        );
        if self.http_port > 0 {
            raw.push_str(&format!(":{}", self.http_port));
        }

        let base = self.base_path.trim();
        if base.is_empty() {
            raw.push('/');
        } else {
            raw.push_str(&join_segment(base));
            if !base.ends_with('/') {
                raw.push('/');
            }
        }
        raw.push_str(self.webthreads_default_route.trim_matches('/'));
        raw.push('/');
        raw.push_str(endpoint.trim_matches('/'));

        let mut url = Url::parse(&raw)?;
        url.query_pairs_mut()
            .append_pair("wtclient", &client_id.to_string());
        Ok(url)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl Settings {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.subscribe_channel.is_empty() || self.unsubscribe_channel.is_empty() {
            return Err(Error::config("Control message names must not be empty"));
        }
        if self.subscribe_channel == self.unsubscribe_channel {
            return Err(Error::config(
                "Subscribe and unsubscribe control messages must differ",
            ));
        }
        if self.eval_command.is_empty() || self.base64_marker.is_empty() {
            return Err(Error::config("Frame prefixes must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than zero"));
        }
        if self.reconnect_max_delay_ms < self.reconnect_delay_ms {
            return Err(Error::config(
                "reconnect_max_delay_ms must not be below reconnect_delay_ms",
            ));
        }
        if self.request_max_tries == 0 || self.request_max_tries < -1 {
            return Err(Error::config("request_max_tries must be positive or -1"));
        }
        if self.max_subscription_trials == 0 {
            return Err(Error::config("max_subscription_trials must be at least 1"));
        }
        ErrorCodes::parse(&self.request_error_codes)?;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Prefixes a path segment with `/` unless it is empty or already rooted.
fn join_segment(segment: &str) -> String {
    let trimmed = segment.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// ============================================================================
// Tests
// ============================================================================
