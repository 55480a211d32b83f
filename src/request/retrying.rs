//! Request primitive with retry, backoff, jitter and timeout.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► [delay: 0 first cycle, jitter afterwards]
//!                 │
//!                 ▼
//!           attempt (timeout armed) ──► status 0 / retryable / timeout
//!                 │                          │ tries left: backoff + jitter, retry
//!                 │                          │ exhausted:  Error(Transport | Timeout)
//!                 ▼
//!           Finished(status, body, headers)
//!                 │ recurring && 2xx
//!                 └──► next cycle
//! ```
//!
//! At most one attempt is outstanding per request; a second `start()`
//! while running is rejected with [`Error::AlreadyRunning`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};

use super::error_codes::ErrorCodes;
use super::http::{HttpClient, HttpRequest, HttpResponse, Method};

// ============================================================================
// Constants
// ============================================================================

/// Backoff stops doubling once this many tries have been made.
const BACKOFF_GROWTH_LIMIT: u32 = 8;

// ============================================================================
// RequestConfig
// ============================================================================

/// Retry and timeout policy of a [`RetryingRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Attempts per cycle; `-1` means unlimited.
    pub max_tries: i32,
    /// Upper bound of the uniform jitter added to every delay.
    pub max_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Start a new cycle after every 2xx completion.
    pub recurring: bool,
    /// Skip JSON parsing of the body.
    pub raw_response: bool,
    /// Statuses that trigger a retry.
    pub error_codes: ErrorCodes,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_tries: 1,
            max_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(60),
            recurring: false,
            raw_response: false,
            error_codes: ErrorCodes::default(),
        }
    }
}

impl RequestConfig {
    /// Builds the pull-cycle policy from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the error-code list is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            max_tries: settings.request_max_tries,
            max_delay: Duration::from_millis(settings.request_max_delay_ms),
            timeout: settings.request_timeout(),
            recurring: false,
            raw_response: false,
            error_codes: ErrorCodes::parse(&settings.request_error_codes)?,
        })
    }

    /// Sets the recurring flag.
    #[inline]
    #[must_use]
    pub fn with_recurring(mut self, recurring: bool) -> Self {
        self.recurring = recurring;
        self
    }

    /// Sets the attempt limit.
    #[inline]
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: i32) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Sets the per-attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the jitter window.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns `true` if another attempt is allowed after `tries`.
    #[inline]
    #[must_use]
    pub fn can_retry(&self, tries: u32) -> bool {
        self.max_tries == -1 || i64::from(tries) < i64::from(self.max_tries)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Why a request gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// Network failure or retryable status, retries exhausted.
    Transport,
    /// No response within the timeout, retries exhausted.
    Timeout,
}

impl RequestError {
    /// Converts into the crate error.
    #[must_use]
    pub fn into_error(self, attempts: u32, timeout_ms: u64) -> Error {
        match self {
            Self::Transport => Error::transport(attempts),
            Self::Timeout => Error::timeout("polling request", timeout_ms),
        }
    }
}

/// A completed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Body parsed as JSON.
    Json(JsonValue),
    /// Raw text (raw mode, or not valid JSON).
    Raw(String),
}

/// Terminal outcome of one request cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// A non-retryable status was received.
    Finished {
        /// HTTP status.
        status: u16,
        /// Parsed or raw body.
        body: ResponseBody,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// Retries were exhausted.
    Error(RequestError),
}

// ============================================================================
// RetryingRequest
// ============================================================================

/// One logical request with retry semantics.
///
/// Outcomes are delivered on the receiver returned by [`RetryingRequest::new`].
pub struct RetryingRequest {
    client: Arc<dyn HttpClient>,
    config: RequestConfig,
    events_tx: mpsc::UnboundedSender<RequestEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    delay_next: Arc<AtomicBool>,
    tries: Arc<AtomicU32>,
}

impl RetryingRequest {
    /// Creates an idle request and its event receiver.
    #[must_use]
    pub fn new(
        client: Arc<dyn HttpClient>,
        config: RequestConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RequestEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let request = Self {
            client,
            config,
            events_tx,
            task: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            delay_next: Arc::new(AtomicBool::new(false)),
            tries: Arc::new(AtomicU32::new(0)),
        };
        (request, events_rx)
    }

    /// Begins a request cycle.
    ///
    /// The first attempt is always deferred to the runtime, never run
    /// inline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if a cycle is outstanding; the
    /// outstanding cycle is unaffected. A cycle stops being outstanding
    /// before its terminal event is delivered.
    pub fn start(
        &self,
        method: Method,
        url: Url,
        headers: Vec<(String, String)>,
        body: String,
    ) -> Result<()> {
        let mut task = self.task.lock();

        if self.running.swap(true, Ordering::SeqCst) {
            warn!(url = %url, "start() called on a request that is currently running");
            return Err(Error::already_running(url.as_str()));
        }

        let cycle = Cycle {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            request: HttpRequest {
                method,
                url,
                headers,
                body,
            },
            events_tx: self.events_tx.clone(),
            running: Arc::clone(&self.running),
            delay_next: Arc::clone(&self.delay_next),
            tries: Arc::clone(&self.tries),
        };

        *task = Some(tokio::spawn(cycle.run()));
        Ok(())
    }

    /// Cancels the outstanding attempt and any pending retry. No event fires.
    pub fn abort(&self) {
        let mut task = self.task.lock();
        if let Some(task) = task.take() {
            task.abort();
            trace!("Request aborted");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while a cycle is outstanding.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Builds the crate error for a failed cycle of this request.
    #[must_use]
    pub fn error_for(&self, reason: RequestError) -> Error {
        reason.into_error(self.tries(), self.config.timeout.as_millis() as u64)
    }

    /// Attempts made in the current (or last) cycle.
    #[must_use]
    pub fn tries(&self) -> u32 {
        self.tries.load(Ordering::SeqCst)
    }

    /// The request's policy.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }
}

impl Drop for RetryingRequest {
    fn drop(&mut self) {
        self.abort();
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// State owned by the spawned cycle task.
struct Cycle {
    client: Arc<dyn HttpClient>,
    config: RequestConfig,
    request: HttpRequest,
    events_tx: mpsc::UnboundedSender<RequestEvent>,
    running: Arc<AtomicBool>,
    delay_next: Arc<AtomicBool>,
    tries: Arc<AtomicU32>,
}

/// Result of one attempt, before retry policy is applied.
enum Attempt {
    Response(HttpResponse),
    NetworkFailure,
    TimedOut,
}

impl Cycle {
    async fn run(self) {
        loop {
            if self.delay_next.swap(false, Ordering::SeqCst) {
                let delay = jitter(self.config.max_delay);
                debug!(delay_ms = delay.as_millis() as u64, "Polling again");
                sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            let (event, again) = self.run_once().await;
            self.delay_next.store(true, Ordering::SeqCst);
            if !again {
                self.running.store(false, Ordering::SeqCst);
            }
            self.emit(event);
            if !again {
                break;
            }
        }
    }

    /// Runs attempts until a terminal outcome; the flag asks for another cycle.
    async fn run_once(&self) -> (RequestEvent, bool) {
        self.tries.store(0, Ordering::SeqCst);
        let mut retry_secs = 0;

        loop {
            let tries = self.tries.fetch_add(1, Ordering::SeqCst) + 1;
            trace!(url = %self.request.url, tries, "Starting attempt");

            let attempt = match timeout(self.config.timeout, self.client.execute(&self.request)).await
            {
                Ok(Ok(response)) => Attempt::Response(response),
                Ok(Err(e)) => {
                    debug!(error = %e, "Attempt failed at network level");
                    Attempt::NetworkFailure
                }
                Err(_) => Attempt::TimedOut,
            };

            let retryable = match &attempt {
                Attempt::Response(r) => self.config.error_codes.contains(r.status),
                Attempt::NetworkFailure | Attempt::TimedOut => true,
            };

            if retryable && self.config.can_retry(tries) {
                retry_secs = next_retry_secs(retry_secs, tries);
                let delay = Duration::from_secs(retry_secs) + jitter(self.config.max_delay);
                debug!(
                    url = %self.request.url,
                    tries,
                    delay_ms = delay.as_millis() as u64,
                    "Trying again"
                );
                sleep(delay).await;
                continue;
            }

            return match attempt {
                Attempt::Response(response) if !retryable => {
                    let status = response.status;
                    let body = parse_body(response.body, self.config.raw_response);
                    let event = RequestEvent::Finished {
                        status,
                        body,
                        headers: response.headers,
                    };
                    (event, self.config.recurring && (200..300).contains(&status))
                }
                Attempt::TimedOut => (RequestEvent::Error(RequestError::Timeout), false),
                _ => (RequestEvent::Error(RequestError::Transport), false),
            };
        }
    }

    fn emit(&self, event: RequestEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("Request event receiver dropped");
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Backoff in whole seconds: 1 after the first try, doubling until the
/// growth limit, then constant.
fn next_retry_secs(previous: u64, tries: u32) -> u64 {
    if tries <= 1 {
        1
    } else if tries < BACKOFF_GROWTH_LIMIT {
        previous.max(1) * 2
    } else {
        previous.max(1)
    }
}

/// Uniform random delay in `[0, max)`.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

fn parse_body(body: String, raw: bool) -> ResponseBody {
    if raw {
        return ResponseBody::Raw(body);
    }
    match serde_json::from_str(&body) {
        Ok(json) => ResponseBody::Json(json),
        Err(_) => ResponseBody::Raw(body),
    }
}

// ============================================================================
// Tests
// ============================================================================
