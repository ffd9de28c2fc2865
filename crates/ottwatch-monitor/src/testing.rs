//! Fakes for exercising the monitor without browsers, devices or a network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use ottwatch_identity::{Identity, IdentityError, IdentityProvider};

use crate::checker::{Checker, CheckerError};
use crate::event::Event;
use crate::notify::{Notifier, NotifyError};
use crate::service::{CheckOutcome, ServiceCheckSpec};
use crate::store::{EventStore, StoreError};

// ── Checker ─────────────────────────────────────────────────────────

/// What a [`ScriptedChecker`] does for one call.
#[derive(Debug, Clone)]
pub enum Script {
    Outcome(CheckOutcome),
    Error(String),
    Panic(String),
}

type Rule = dyn Fn(&ServiceCheckSpec, &Identity) -> Script + Send + Sync;

/// Checker whose answers are decided by a closure over (service, identity).
pub struct ScriptedChecker {
    rule: Box<Rule>,
    calls: Mutex<Vec<(String, Identity)>>,
}

impl ScriptedChecker {
    pub fn new<F>(rule: F) -> Self
    where
        F: Fn(&ServiceCheckSpec, &Identity) -> Script + Send + Sync + 'static,
    {
        Self {
            rule: Box::new(rule),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn passing() -> Self {
        Self::new(|_, _| Script::Outcome(CheckOutcome::passed(None)))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Script::Outcome(CheckOutcome::failed(None)))
    }

    /// Every call so far as `(service, identity)`, in order.
    pub fn calls(&self) -> Vec<(String, Identity)> {
        self.calls.lock().expect("checker calls lock poisoned").clone()
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(
        &self,
        spec: &ServiceCheckSpec,
        identity: &Identity,
    ) -> Result<CheckOutcome, CheckerError> {
        self.calls
            .lock()
            .expect("checker calls lock poisoned")
            .push((spec.name.clone(), identity.clone()));
        match (self.rule)(spec, identity) {
            Script::Outcome(outcome) => Ok(outcome),
            Script::Error(msg) => Err(CheckerError::Command(msg)),
            Script::Panic(msg) => panic!("{msg}"),
        }
    }
}

// ── Notifier ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text(String),
    Artifact { artifact: String, caption: String },
}

/// Records every notification attempt; optionally fails each one.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    fn push(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(notification);
        if self.fail {
            Err(NotifyError::Rejected {
                status: 500,
                body: "recording notifier set to fail".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_text(&self, message: &str) -> Result<(), NotifyError> {
        self.push(Notification::Text(message.to_string()))
    }

    async fn notify_artifact(&self, artifact: &str, caption: &str) -> Result<(), NotifyError> {
        self.push(Notification::Artifact {
            artifact: artifact.to_string(),
            caption: caption.to_string(),
        })
    }
}

// ── IdentityProvider ────────────────────────────────────────────────

/// Cyclic identity pool with switchable link health and rotation failures.
pub struct FakeIdentity {
    pool: Vec<Identity>,
    index: AtomicUsize,
    rotations: AtomicUsize,
    healthy: AtomicBool,
    fail_rotation: AtomicBool,
    last_good: Mutex<Option<Identity>>,
}

impl FakeIdentity {
    pub fn new(pool: &[&str]) -> Self {
        assert!(!pool.is_empty(), "fake identity pool must not be empty");
        Self {
            pool: pool.iter().map(|id| Identity::new(*id)).collect(),
            index: AtomicUsize::new(0),
            rotations: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            fail_rotation: AtomicBool::new(false),
            last_good: Mutex::new(None),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_rotation(&self, fail: bool) {
        self.fail_rotation.store(fail, Ordering::SeqCst);
    }

    pub fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn current(&self) -> Identity {
        self.pool[self.index.load(Ordering::SeqCst) % self.pool.len()].clone()
    }

    async fn rotate(&self) -> Result<Identity, IdentityError> {
        if self.fail_rotation.load(Ordering::SeqCst) {
            return Err(IdentityError::Rotation("modem not responding".to_string()));
        }
        self.rotations.fetch_add(1, Ordering::SeqCst);
        let next = (self.index.load(Ordering::SeqCst) + 1) % self.pool.len();
        self.index.store(next, Ordering::SeqCst);
        Ok(self.pool[next].clone())
    }

    async fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn record_last_good(&self, identity: &Identity) {
        *self.last_good.lock().expect("last good lock poisoned") = Some(identity.clone());
    }

    fn last_good(&self) -> Option<Identity> {
        self.last_good.lock().expect("last good lock poisoned").clone()
    }
}

// ── EventStore ──────────────────────────────────────────────────────

/// In-memory store that can be switched into failing every append.
#[derive(Default)]
pub struct FailingEventStore {
    events: Mutex<Vec<Event>>,
    failing: AtomicBool,
    rejected: AtomicUsize,
}

impl FailingEventStore {
    /// Starts out failing.
    pub fn new() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event store lock poisoned").clone()
    }
}

impl EventStore for FailingEventStore {
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.events
            .lock()
            .expect("event store lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

// ── HTTP ────────────────────────────────────────────────────────────

/// Serve exactly one HTTP request on a loopback port.
///
/// Returns the base URL and a handle resolving to the raw request text
/// (headers and body).
pub async fn serve_http_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let raw = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            reason_phrase(status),
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        raw
    });

    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body = &buf[end + 4..];
            let complete = if let Some(len) = content_length(&head) {
                body.len() >= len
            } else if head.contains("transfer-encoding: chunked") {
                find(body, b"0\r\n\r\n").is_some()
            } else {
                true
            };
            if complete {
                break;
            }
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn content_length(head: &str) -> Option<usize> {
    head.lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
