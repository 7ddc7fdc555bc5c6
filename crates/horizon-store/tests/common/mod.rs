//! Shared test doubles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use horizon_store::{NetworkError, Transport, TransportRequest};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

type Handler = dyn Fn(&TransportRequest) -> Result<Value, NetworkError> + Send + Sync;

/// A transport answering from a closure and recording every request.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&TransportRequest) -> Result<Value, NetworkError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `body`.
    pub fn replying(body: Value) -> Self {
        Self::new(move |_| Ok(body.clone()))
    }

    /// Answer with queued bodies in order; the last one repeats.
    pub fn sequence(bodies: Vec<Value>) -> Self {
        let calls = AtomicUsize::new(0);
        Self::new(move |_| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            Ok(bodies[call.min(bodies.len() - 1)].clone())
        })
    }

    /// Always fail with `error`.
    pub fn failing(error: NetworkError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, NetworkError> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}

/// A transport whose first request waits until a later request arrives.
pub struct GatedTransport {
    calls: AtomicUsize,
    gate: Notify,
    bodies: Vec<Value>,
}

impl GatedTransport {
    pub fn new(bodies: Vec<Value>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
            bodies,
        }
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, _request: TransportRequest) -> Result<Value, NetworkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.gate.notified().await;
        } else {
            self.gate.notify_one();
        }
        Ok(self.bodies[call.min(self.bodies.len() - 1)].clone())
    }
}

/// A transport answering loads with `body` and holding each commit until
/// `release` is notified. `sent` is notified when a commit arrives.
pub struct HeldCommitTransport {
    body: Value,
    pub sent: Notify,
    pub release: Notify,
    commits: Mutex<Vec<TransportRequest>>,
}

impl HeldCommitTransport {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            sent: Notify::new(),
            release: Notify::new(),
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn commits(&self) -> Vec<TransportRequest> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl Transport for HeldCommitTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, NetworkError> {
        if !request.params.contains_key("records") {
            return Ok(self.body.clone());
        }
        self.commits.lock().push(request);
        self.sent.notify_one();
        self.release.notified().await;
        Ok(json!({"success": true}))
    }
}

/// A tree backend: answers root loads with `roots` and `parent` requests
/// from `children`, keyed by the parent's encoded primary key.
pub fn tree_backend(roots: Vec<Value>, children: HashMap<String, Vec<Value>>) -> MockTransport {
    MockTransport::new(move |request| {
        let records = match request.params.get("parent").and_then(Value::as_str) {
            Some(parent) => children.get(parent).cloned().unwrap_or_default(),
            None => roots.clone(),
        };
        Ok(json!({"success": true, "records": records}))
    })
}

/// Parameter of a recorded request as a string.
pub fn param(request: &TransportRequest, name: &str) -> Option<String> {
    request.params.get(name).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("horizon_store=debug")
        .with_test_writer()
        .try_init();
}
