//! Channel-backed stand-in for a Tendermint node.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::channel::mpsc as fmpsc;
use futures::SinkExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use chainsub_core::{JsonRpcRequest, TransportError};
use chainsub_ws::{Connector, FrameSink, FrameStream, Inbound};

/// Node side of one accepted connection.
pub struct MockSession {
    requests: fmpsc::UnboundedReceiver<String>,
    inbound: fmpsc::UnboundedSender<Result<Inbound, TransportError>>,
}

impl MockSession {
    /// Next request the manager sent.
    pub async fn next_request(&mut self) -> JsonRpcRequest {
        use futures::StreamExt;
        let text = self
            .requests
            .next()
            .await
            .expect("manager closed the socket");
        serde_json::from_str(&text).expect("request is valid JSON-RPC")
    }

    /// Next request, or `None` if nothing arrives within `wait` or the
    /// socket was closed.
    pub async fn request_within(&mut self, wait: Duration) -> Option<JsonRpcRequest> {
        use futures::StreamExt;
        let text = tokio::time::timeout(wait, self.requests.next())
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&text).ok()
    }

    /// Every remaining request until the manager closes the socket.
    pub async fn drain(&mut self) -> Vec<JsonRpcRequest> {
        use futures::StreamExt;
        let mut requests = Vec::new();
        while let Some(text) = self.requests.next().await {
            requests.push(serde_json::from_str(&text).expect("request is valid JSON-RPC"));
        }
        requests
    }

    pub fn push(&self, frame: Value) {
        self.inbound
            .unbounded_send(Ok(Inbound::Text(frame.to_string())))
            .expect("manager dropped the socket");
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.unbounded_send(Ok(Inbound::Text(text.to_string())));
    }

    pub fn ack(&self, id: u64) {
        self.push(json!({ "jsonrpc": "2.0", "id": id, "result": {} }));
    }

    pub fn reject(&self, id: u64, message: &str) {
        self.push(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32603, "message": message }
        }));
    }

    /// Send a transaction event frame; each slice is one embedded event.
    pub fn push_tx(&self, id: u64, events: &[&[(&str, &str)]]) {
        self.push(tx_frame(id, events));
    }

    /// Server-initiated close.
    pub fn close(&self, clean: bool) {
        let _ = self.inbound.unbounded_send(Ok(Inbound::Close { clean }));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(TransportError::WebSocket(reason.to_string())));
    }
}

/// Build a `tendermint/event/Tx` data frame with base64 attributes.
pub fn tx_frame(id: u64, events: &[&[(&str, &str)]]) -> Value {
    let events: Vec<Value> = events
        .iter()
        .map(|attrs| {
            let attributes: Vec<Value> = attrs
                .iter()
                .map(|(k, v)| json!({ "key": STANDARD.encode(k), "value": STANDARD.encode(v), "index": true }))
                .collect();
            json!({ "type": "message", "attributes": attributes })
        })
        .collect();
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "query": "tm.event='Tx'",
            "data": {
                "type": "tendermint/event/Tx",
                "value": { "TxResult": { "height": "100", "index": 0, "result": { "events": events } } }
            },
            "events": { "tm.event": ["Tx"], "tx.height": ["100"] }
        }
    })
}

/// Hands each new connection's node side to the test.
pub struct MockConnector {
    sessions: mpsc::UnboundedSender<MockSession>,
    refuse: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSession>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            sessions,
            refuse: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refuse = self.refuse.load(Ordering::SeqCst);
        if refuse > 0 {
            self.refuse.store(refuse - 1, Ordering::SeqCst);
            return Err(TransportError::Connect {
                url: self.url().to_string(),
                reason: "connection refused".into(),
            });
        }

        let (req_tx, req_rx) = fmpsc::unbounded::<String>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<Inbound, TransportError>>();
        self.sessions
            .send(MockSession {
                requests: req_rx,
                inbound: in_tx,
            })
            .map_err(|_| TransportError::Closed)?;

        let sink: FrameSink =
            Box::pin(req_tx.sink_map_err(|e| TransportError::WebSocket(e.to_string())));
        let stream: FrameStream = Box::pin(in_rx);
        Ok((sink, stream))
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}

/// Wait for the next connection the manager makes.
pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<MockSession>) -> MockSession {
    sessions.recv().await.expect("connector dropped")
}

/// Let the manager task drain its queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
