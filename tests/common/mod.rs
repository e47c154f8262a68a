//! Shared test harness.
//!
//! Provides a scripted [`MockConnector`] whose links record every frame the
//! pool writes and let a test inject inbound messages, errors and remote
//! closes.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use url::Url;

use ws_connection_pool::{
    Connector, Error, OpenedTransport, PoolBuilder, Result, Transport, TransportEvent,
};

// ============================================================================
// Behavior
// ============================================================================

/// Outcome of one open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Opens immediately.
    Open,
    /// Fails immediately.
    Fail,
    /// Never completes; the pool's connection timeout decides.
    Hang,
}

// ============================================================================
// MockLink
// ============================================================================

/// One opened mock transport.
#[derive(Clone)]
pub struct MockLink {
    pub url: String,
    frames: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<u16>>>,
    failing: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockLink {
    fn new(url: &Url, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            url: url.to_string(),
            frames: Arc::default(),
            closes: Arc::default(),
            failing: Arc::default(),
            events,
        }
    }

    /// Raw frames written by the pool.
    pub fn sent(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Frames written by the pool, parsed.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("pool writes JSON"))
            .collect()
    }

    /// Frames of the given message type.
    pub fn sent_of_type(&self, message_type: &str) -> Vec<Value> {
        self.sent_json()
            .into_iter()
            .filter(|frame| frame["type"] == message_type)
            .collect()
    }

    /// Close codes the pool sent on this link.
    pub fn close_codes(&self) -> Vec<u16> {
        self.closes.lock().clone()
    }

    /// Makes subsequent writes fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delivers an inbound text frame.
    pub fn push_message(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    /// Reports a transport error.
    pub fn push_error(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Error(reason.to_string()));
    }

    /// Simulates the remote end closing the link.
    pub fn close_remote(&self, code: u16) {
        let _ = self.events.send(TransportEvent::Closed {
            code: Some(code),
            reason: "remote closed".to_string(),
        });
    }
}

impl Transport for MockLink {
    fn send(&self, text: String) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.frames.lock().push(text);
        Ok(())
    }

    fn close(&self, code: u16, _reason: &str) -> Result<()> {
        self.closes.lock().push(code);
        Ok(())
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Connector driven by per-URL scripts.
///
/// Each URL has a list of behaviors consumed one per attempt; the last one
/// repeats. Unscripted URLs open.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<FxHashMap<String, VecDeque<Behavior>>>,
    links: Mutex<Vec<MockLink>>,
    attempts: Mutex<Vec<(String, Instant)>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the outcomes of successive attempts on `url`.
    pub fn script(&self, url: &str, behaviors: &[Behavior]) {
        self.scripts
            .lock()
            .insert(normalize(url), behaviors.iter().copied().collect());
    }

    /// Every opened link, in open order.
    pub fn links(&self) -> Vec<MockLink> {
        self.links.lock().clone()
    }

    /// The `index`-th opened link.
    pub fn link(&self, index: usize) -> MockLink {
        self.links.lock()[index].clone()
    }

    /// Links opened for `url`, in open order.
    pub fn links_for(&self, url: &str) -> Vec<MockLink> {
        let url = normalize(url);
        self.links
            .lock()
            .iter()
            .filter(|link| link.url == url)
            .cloned()
            .collect()
    }

    /// Instants of the open attempts on `url`.
    pub fn attempts_for(&self, url: &str) -> Vec<Instant> {
        let url = normalize(url);
        self.attempts
            .lock()
            .iter()
            .filter(|(attempted, _)| *attempted == url)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Total open attempts.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    fn next_behavior(&self, url: &str) -> Behavior {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(Behavior::Open),
            Some(script) => script.front().copied().unwrap_or(Behavior::Open),
            None => Behavior::Open,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<OpenedTransport> {
        let key = url.to_string();
        self.attempts.lock().push((key.clone(), Instant::now()));

        match self.next_behavior(&key) {
            Behavior::Open => {
                let (tx, rx) = mpsc::unbounded_channel();
                let link = MockLink::new(url, tx);
                self.links.lock().push(link.clone());
                Ok(OpenedTransport::new(Box::new(link), rx))
            }
            Behavior::Fail => Err(Error::connection(format!("{key} refused"))),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Canonical URL string, as the pool reports it.
pub fn normalize(url: &str) -> String {
    Url::parse(url).expect("test URL").to_string()
}

/// Builder wired to `connector` with quiet monitor intervals.
pub fn builder(connector: &Arc<MockConnector>) -> PoolBuilder {
    init_tracing();
    PoolBuilder::new()
        .connector(Arc::clone(connector) as Arc<dyn Connector>)
        .heartbeat_interval(Duration::from_secs(3600))
        .health_check_interval(Duration::from_secs(3600))
}

/// Lets spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
