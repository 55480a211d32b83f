//! Shared test doubles.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use webchannels::config::TransportKind;
use webchannels::transport::EventSender;
use webchannels::{Connector, Error, Result, Transport, TransportEvent};

// ============================================================================
// MockTransport
// ============================================================================

/// A scripted transport.
pub struct MockTransport {
    ready: AtomicBool,
    closed: AtomicBool,
    auto_ack: bool,
    sent: Mutex<Vec<String>>,
    events: EventSender,
}

impl MockTransport {
    /// Marks the transport ready and emits `Open`.
    pub fn open(&self) {
        self.ready.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Open);
    }

    /// Emits `Open` while the transport still refuses frames.
    pub fn announce_open(&self) {
        let _ = self.events.send(TransportEvent::Open);
    }

    /// Delivers a raw inbound frame.
    pub fn deliver(&self, raw: &str) {
        let _ = self.events.send(TransportEvent::Message(raw.to_string()));
    }

    /// Simulates the server going away.
    pub fn drop_connection(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Close);
        }
    }

    /// Frames handed to this transport.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, text: String) -> bool {
        if !self.is_ready() {
            return false;
        }
        let subscribe = text.contains(r#""message":"subscribe""#);
        self.sent.lock().push(text);
        if subscribe && self.auto_ack {
            let _ = self.events.send(TransportEvent::Message("Subscription: OK".to_string()));
        }
        true
    }

    fn close(&self) {
        self.drop_connection();
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Hands out [`MockTransport`]s and keeps them for inspection.
pub struct MockConnector {
    transports: Mutex<Vec<Arc<MockTransport>>>,
    auto_open: AtomicBool,
    auto_ack: AtomicBool,
    failing: AtomicBool,
    refusing: AtomicBool,
    connects: AtomicUsize,
}

impl MockConnector {
    /// Transports open at once and acknowledge subscriptions.
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            transports: Mutex::new(Vec::new()),
            auto_open: AtomicBool::new(true),
            auto_ack: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            refusing: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        })
    }

    /// Transports stay closed until [`MockTransport::open`] is called.
    pub fn manual() -> Arc<Self> {
        let connector = Self::healthy();
        connector.auto_open.store(false, Ordering::SeqCst);
        connector
    }

    /// Subscribe frames are not acknowledged.
    pub fn without_ack(self: Arc<Self>) -> Arc<Self> {
        self.auto_ack.store(false, Ordering::SeqCst);
        self
    }

    /// While failing, every new transport reports an error and closes.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// While refusing, `connect` itself returns an error.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.transports.lock()[index])
    }

    pub fn last(&self) -> Arc<MockTransport> {
        let transports = self.transports.lock();
        Arc::clone(transports.last().expect("no transport opened"))
    }

    /// Every frame sent on any transport.
    pub fn all_sent(&self) -> Vec<String> {
        self.transports
            .lock()
            .iter()
            .flat_map(|t| t.sent())
            .collect()
    }
}

impl Connector for MockConnector {
    fn connect(&self, events: EventSender) -> Result<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(Error::connection("no route to host"));
        }
        let transport = Arc::new(MockTransport {
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            auto_ack: self.auto_ack.load(Ordering::SeqCst),
            sent: Mutex::new(Vec::new()),
            events,
        });

        if self.failing.load(Ordering::SeqCst) {
            let _ = transport
                .events
                .send(TransportEvent::Error(Error::connection("connection refused")));
            transport.drop_connection();
        } else if self.auto_open.load(Ordering::SeqCst) {
            transport.open();
        }

        self.transports.lock().push(Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Polls `condition` on the (paused) clock until it holds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Lets spawned tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
