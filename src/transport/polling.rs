//! HTTP push/pull transport.
//!
//! Emulates a full-duplex pipe with three endpoints under
//! `{base}{default_route}/`, each called with `?wtclient={id}`:
//!
//! | Endpoint | Method | Role |
//! |----------|--------|------|
//! | subscribe | GET | registers the client id; success fires `Open` |
//! | pull | POST | recurring; the response body carries inbound frames |
//! | push | POST | one per outbound frame; aborts and restarts the pull |
//!
//! `close()` calls the unsubscribe endpoint best-effort and fires `Close`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::{Settings, TransportKind};
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::request::{
    HttpClient, Method, RequestConfig, RequestEvent, ResponseBody, RetryingRequest,
};

use super::{Connector, EventSender, Transport, TransportEvent};

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the driver task.
enum PollCommand {
    /// Push one encoded frame.
    Push(String),
    /// Unsubscribe and stop.
    Shutdown,
}

/// Resolved endpoint URLs for one client id.
#[derive(Debug, Clone)]
struct Endpoints {
    subscribe: Url,
    unsubscribe: Url,
    pull: Url,
    push: Url,
}

impl Endpoints {
    fn new(settings: &Settings, client_id: ClientId) -> Result<Self> {
        Ok(Self {
            subscribe: settings.polling_url(&settings.subscribe_channel, client_id)?,
            unsubscribe: settings.polling_url(&settings.unsubscribe_channel, client_id)?,
            pull: settings.polling_url(&settings.webthreads_pull_route, client_id)?,
            push: settings.polling_url(&settings.webthreads_push_route, client_id)?,
        })
    }
}

// ============================================================================
// PollingTransport
// ============================================================================

/// A half-duplex transport built on [`RetryingRequest`] cycles.
pub struct PollingTransport {
    client_id: ClientId,
    ready: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<PollCommand>,
}

impl PollingTransport {
    /// Starts the subscribe request and, once it succeeds, the pull cycle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if an endpoint URL cannot be built, or
    /// [`crate::Error::Config`] if the retryable status list is invalid.
    pub fn open(
        settings: Arc<Settings>,
        client: Arc<dyn HttpClient>,
        client_id: ClientId,
        events: EventSender,
    ) -> Result<Self> {
        let endpoints = Endpoints::new(&settings, client_id)?;
        let request_config = RequestConfig::from_settings(&settings)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            settings,
            client,
            endpoints,
            request_config,
            events,
            ready: Arc::clone(&ready),
        };
        tokio::spawn(driver.run(command_rx));

        Ok(Self {
            client_id,
            ready,
            command_tx,
        })
    }

    /// The id sent as `wtclient` on every request.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, text: String) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.command_tx.send(PollCommand::Push(text)).is_ok()
    }

    fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        let _ = self.command_tx.send(PollCommand::Shutdown);
    }
}

// ============================================================================
// Driver
// ============================================================================

/// State owned by the driver task.
struct Driver {
    settings: Arc<Settings>,
    client: Arc<dyn HttpClient>,
    endpoints: Endpoints,
    request_config: RequestConfig,
    events: EventSender,
    ready: Arc<AtomicBool>,
}

impl Driver {
    async fn run(self, mut command_rx: mpsc::UnboundedReceiver<PollCommand>) {
        if !self.subscribe().await {
            self.ready.store(false, Ordering::SeqCst);
            self.emit(TransportEvent::Close);
            return;
        }

        self.ready.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Open);

        let (pull, mut pull_events) = RetryingRequest::new(
            Arc::clone(&self.client),
            self.request_config.clone().with_recurring(true),
        );
        self.start_pull(&pull);

        let retry_interval = self.settings.poll_interval() * 2;
        let mut restart_at: Option<Instant> = None;
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                Some(event) = pull_events.recv() => {
                    let failed = match event {
                        RequestEvent::Finished { status, body, .. } if (200..300).contains(&status) => {
                            failures = 0;
                            self.dispatch(body);
                            false
                        }
                        RequestEvent::Finished { status, .. } => {
                            let error = Error::connection(format!("pull returned status {status}"));
                            self.emit(TransportEvent::Error(error));
                            true
                        }
                        RequestEvent::Error(reason) => {
                            self.emit(TransportEvent::Error(pull.error_for(reason)));
                            true
                        }
                    };

                    if failed {
                        failures += 1;
                        if failures >= self.settings.max_connection_attempts {
                            warn!(failures, "Pull failed too many times, closing");
                            break;
                        }
                        debug!(failures, retry_ms = retry_interval.as_millis() as u64, "Pull failed, retrying");
                        restart_at = Some(Instant::now() + retry_interval);
                    }
                }

                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    restart_at = None;
                    self.start_pull(&pull);
                }

                command = command_rx.recv() => {
                    match command {
                        Some(PollCommand::Push(body)) => {
                            pull.abort();
                            restart_at = None;
                            self.push(body).await;
                            self.start_pull(&pull);
                        }

                        Some(PollCommand::Shutdown) | None => {
                            pull.abort();
                            self.unsubscribe().await;
                            break;
                        }
                    }
                }
            }
        }

        pull.abort();
        self.ready.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Close);
        trace!("Polling driver terminated");
    }

    /// GETs the subscribe endpoint. Returns `true` on a 2xx response.
    async fn subscribe(&self) -> bool {
        match self.one_shot(Method::Get, self.endpoints.subscribe.clone(), String::new()).await {
            Some(Ok((status, body))) if (200..300).contains(&status) => {
                if self.settings.is_dev() {
                    info!(url = %self.endpoints.subscribe, "Polling subscription registered");
                }
                self.dispatch(body);
                true
            }
            Some(Ok((status, _))) => {
                self.emit(TransportEvent::Error(Error::connection(format!(
                    "subscribe returned status {status}"
                ))));
                false
            }
            Some(Err(e)) => {
                self.emit(TransportEvent::Error(e));
                false
            }
            None => false,
        }
    }

    /// GETs the unsubscribe endpoint, ignoring the outcome.
    async fn unsubscribe(&self) {
        let url = self.endpoints.unsubscribe.clone();
        let outcome = self.one_shot(Method::Get, url, String::new()).await;
        trace!(?outcome, "Unsubscribe request completed");
    }

    /// POSTs one frame. Frames carried by the response are dispatched.
    async fn push(&self, body: String) {
        match self.one_shot(Method::Post, self.endpoints.push.clone(), body).await {
            Some(Ok((status, body))) if (200..300).contains(&status) => {
                self.dispatch(body);
            }
            Some(Ok((status, _))) => {
                self.emit(TransportEvent::Error(Error::connection(format!(
                    "push returned status {status}"
                ))));
            }
            Some(Err(e)) => self.emit(TransportEvent::Error(e)),
            None => {}
        }
    }

    /// Runs one non-recurring cycle; `None` if it could not be started.
    async fn one_shot(
        &self,
        method: Method,
        url: Url,
        body: String,
    ) -> Option<Result<(u16, ResponseBody)>> {
        let (request, mut events) =
            RetryingRequest::new(Arc::clone(&self.client), self.request_config.clone());
        if let Err(e) = request.start(method, url, Vec::new(), body) {
            warn!(error = %e, "Failed to start request");
            return None;
        }
        match events.recv().await? {
            RequestEvent::Finished { status, body, .. } => Some(Ok((status, body))),
            RequestEvent::Error(reason) => Some(Err(request.error_for(reason))),
        }
    }

    fn start_pull(&self, pull: &RetryingRequest) {
        if let Err(e) = pull.start(Method::Post, self.endpoints.pull.clone(), Vec::new(), String::new()) {
            trace!(error = %e, "Pull already running");
        }
    }

    /// Splits a response body into frames and emits each as a message.
    fn dispatch(&self, body: ResponseBody) {
        for frame in frames(body) {
            self.emit(TransportEvent::Message(frame));
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("Transport event receiver dropped");
        }
    }
}

/// A JSON array is a batch, a string is one frame, null or blank is nothing.
fn frames(body: ResponseBody) -> Vec<String> {
    match body {
        ResponseBody::Json(JsonValue::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::String(s) => Some(s),
                JsonValue::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        ResponseBody::Json(JsonValue::String(s)) => vec![s],
        ResponseBody::Json(JsonValue::Null) => Vec::new(),
        ResponseBody::Json(other) => vec![other.to_string()],
        ResponseBody::Raw(s) if s.trim().is_empty() => Vec::new(),
        ResponseBody::Raw(s) => vec![s],
    }
}

// ============================================================================
// PollingConnector
// ============================================================================

/// Opens [`PollingTransport`]s that share one client id.
#[derive(Clone)]
pub struct PollingConnector {
    settings: Arc<Settings>,
    client: Arc<dyn HttpClient>,
    client_id: ClientId,
}

impl PollingConnector {
    /// Creates a connector with a freshly generated client id.
    #[must_use]
    pub fn new(settings: Arc<Settings>, client: Arc<dyn HttpClient>) -> Self {
        Self::with_client_id(settings, client, ClientId::generate())
    }

    /// Creates a connector with a fixed client id.
    #[must_use]
    pub fn with_client_id(
        settings: Arc<Settings>,
        client: Arc<dyn HttpClient>,
        client_id: ClientId,
    ) -> Self {
        Self {
            settings,
            client,
            client_id,
        }
    }

    /// The client id carried by every request.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// How long a failed pull waits before restarting.
    #[inline]
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.settings.poll_interval() * 2
    }
}

impl Connector for PollingConnector {
    fn connect(&self, events: EventSender) -> Result<Arc<dyn Transport>> {
        let transport = PollingTransport::open(
            Arc::clone(&self.settings),
            Arc::clone(&self.client),
            self.client_id,
            events,
        )?;
        Ok(Arc::new(transport))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::Error;
    use crate::request::{HttpRequest, HttpResponse};

    /// In-memory polling server.
    struct MockServer {
        subscribe_status: u16,
        pulls: Mutex<VecDeque<&'static str>>,
        pull_fails: bool,
        log: Mutex<Vec<(Method, String, String)>>,
    }

    impl MockServer {
        fn new(pulls: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                subscribe_status: 200,
                pulls: Mutex::new(pulls.into()),
                pull_fails: false,
                log: Mutex::new(Vec::new()),
            })
        }

        fn endpoint_calls(&self, endpoint: &str) -> Vec<String> {
            self.log
                .lock()
                .iter()
                .filter(|(_, path, _)| path.ends_with(endpoint))
                .map(|(_, _, body)| body.clone())
                .collect()
        }
    }

    #[async_trait]
    impl HttpClient for MockServer {
        async fn execute(&self, request: &HttpRequest) -> crate::error::Result<HttpResponse> {
            let path = request.url.path().to_string();
            self.log
                .lock()
                .push((request.method, path.clone(), request.body.clone()));

            if path.ends_with("/unsubscribe") {
                Ok(HttpResponse::new(200, ""))
            } else if path.ends_with("/subscribe") {
                Ok(HttpResponse::new(self.subscribe_status, ""))
            } else if path.ends_with("/push") {
                Ok(HttpResponse::new(200, "[]"))
            } else if self.pull_fails {
                Err(Error::connection("refused"))
            } else {
                let body = self.pulls.lock().pop_front().unwrap_or("[]");
                Ok(HttpResponse::new(200, body))
            }
        }
    }

    fn settings() -> Arc<Settings> {
        let mut settings = Settings::new()
            .with_transport(TransportKind::Polling)
            .with_http_endpoint("example.com", 0);
        settings.max_connection_attempts = 3;
        Arc::new(settings)
    }

    fn open(server: &Arc<MockServer>) -> (PollingTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client: Arc<dyn HttpClient> = server.clone();
        let transport =
            PollingTransport::open(settings(), client, ClientId::from_u32(42), tx).unwrap();
        (transport, rx)
    }

    #[test]
    fn test_frames() {
        let batch = ResponseBody::Json(serde_json::json!(["a", {"k": 1}, null]));
        assert_eq!(frames(batch), vec!["a".to_string(), r#"{"k":1}"#.to_string()]);
        assert_eq!(frames(ResponseBody::Json(JsonValue::Null)), Vec::<String>::new());
        assert_eq!(frames(ResponseBody::Raw("  ".into())), Vec::<String>::new());
        assert_eq!(frames(ResponseBody::Raw("hi".into())), vec!["hi".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_then_pull_batch() {
        let server = MockServer::new(vec![r#"["one","two"]"#]);
        let (transport, mut rx) = open(&server);

        assert!(!transport.is_ready());
        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        assert!(transport.is_ready());
        assert!(matches!(rx.recv().await, Some(TransportEvent::Message(m)) if m == "one"));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Message(m)) if m == "two"));

        let log = server.log.lock();
        assert_eq!(log[0].0, Method::Get);
        assert_eq!(log[0].1, "/__/subscribe");
        assert_eq!(log[1].0, Method::Post);
        assert_eq!(log[1].1, "/__/pull");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_pushes_frame() {
        let server = MockServer::new(vec![r#"["ping"]"#]);
        let (transport, mut rx) = open(&server);

        assert!(!transport.send("too early".into()));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Message(m)) if m == "ping"));

        assert!(transport.send(r#"{"channel":"__"}"#.into()));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            server.endpoint_calls("/push"),
            vec![r#"{"channel":"__"}"#.to_string()]
        );
        assert_eq!(transport.kind(), TransportKind::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_failures_close_after_limit() {
        let server = Arc::new(MockServer {
            subscribe_status: 200,
            pulls: Mutex::new(VecDeque::new()),
            pull_fails: true,
            log: Mutex::new(Vec::new()),
        });
        let (transport, mut rx) = open(&server);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        for _ in 0..3 {
            assert!(matches!(
                rx.recv().await,
                Some(TransportEvent::Error(Error::Transport { attempts: 1 }))
            ));
        }
        assert!(matches!(rx.recv().await, Some(TransportEvent::Close)));
        assert!(!transport.is_ready());
        assert_eq!(server.endpoint_calls("/pull").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_rejected() {
        let server = Arc::new(MockServer {
            subscribe_status: 404,
            pulls: Mutex::new(VecDeque::new()),
            pull_fails: false,
            log: Mutex::new(Vec::new()),
        });
        let (_transport, mut rx) = open(&server);

        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Error(Error::Connection { .. }))
        ));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Close)));
        assert!(server.endpoint_calls("/pull").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unsubscribes() {
        let server = MockServer::new(vec![]);
        let (transport, mut rx) = open(&server);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        transport.close();
        assert!(!transport.is_ready());
        assert!(matches!(rx.recv().await, Some(TransportEvent::Close)));
        assert_eq!(server.endpoint_calls("/unsubscribe").len(), 1);
    }

    #[tokio::test]
    async fn test_connector_keeps_client_id() {
        let server = MockServer::new(vec![]);
        let client: Arc<dyn HttpClient> = server.clone();
        let connector =
            PollingConnector::with_client_id(settings(), client, ClientId::from_u32(9));
        assert_eq!(connector.client_id(), ClientId::from_u32(9));
        assert_eq!(connector.retry_interval(), Duration::from_secs(2));
    }
}
