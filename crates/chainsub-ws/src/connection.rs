//! The single physical socket.
//!
//! Each connection attempt runs in its own task and reports back to the
//! manager through [`SocketEvent`]s tagged with the connection's
//! generation. The manager compares that tag with its current connection
//! and drops events from superseded sockets.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use chainsub_core::{encode_request, JsonRpcRequest, SubscriptionError, TransportError};

use crate::transport::{Connector, Inbound};

/// Something that happened on a socket.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Opened,
    Frame(String),
    Error(TransportError),
    Closed { clean: bool },
}

/// A socket event with the generation of the socket that produced it.
pub(crate) type TaggedEvent = (u64, SocketEvent);

/// Manager-side handle to one socket task.
pub(crate) struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    open: bool,
}

impl Connection {
    /// Start a connection attempt.
    pub(crate) fn spawn(
        generation: u64,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(socket_task(generation, connector, outbound_rx, events));
        Self {
            generation,
            outbound,
            open: false,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    /// Queue a request on the socket.
    pub(crate) fn send(&self, req: &JsonRpcRequest) -> Result<(), SubscriptionError> {
        if !self.open {
            return Err(SubscriptionError::NotConnected);
        }
        let text = encode_request(req).map_err(|e| {
            tracing::error!(id = req.id, error = %e, "failed to encode request");
            SubscriptionError::from(e)
        })?;
        tracing::debug!(id = req.id, method = %req.method, query = ?req.query(), "sending frame");
        self.outbound
            .send(text)
            .map_err(|_| SubscriptionError::NotConnected)
    }

    /// Close the socket after flushing any queued frames.
    ///
    /// Dropping the outbound sender is the close signal for the socket task.
    pub(crate) fn close(self) {
        tracing::debug!(generation = self.generation, "closing socket");
    }
}

async fn socket_task(
    generation: u64,
    connector: Arc<dyn Connector>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TaggedEvent>,
) {
    let report = |event: SocketEvent| {
        let _ = events.send((generation, event));
    };

    tracing::info!(url = %connector.url(), generation, "connecting via WebSocket");

    let (mut sink, mut stream) = match connector.connect().await {
        Ok(io) => io,
        Err(e) => {
            tracing::warn!(error = %e, "WS connect failed");
            report(SocketEvent::Error(e));
            report(SocketEvent::Closed { clean: false });
            return;
        }
    };

    report(SocketEvent::Opened);

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(text).await {
                        tracing::warn!(error = %e, "WS send error");
                        report(SocketEvent::Error(e));
                        report(SocketEvent::Closed { clean: false });
                        return;
                    }
                }
                None => {
                    // Manager dropped its handle: local, expected close.
                    let _ = sink.close().await;
                    report(SocketEvent::Closed { clean: true });
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Inbound::Text(text))) => report(SocketEvent::Frame(text)),
                Some(Ok(Inbound::Close { clean })) => {
                    tracing::info!(clean, "WebSocket closed by server");
                    report(SocketEvent::Closed { clean });
                    return;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WS receive error");
                    report(SocketEvent::Error(e));
                    report(SocketEvent::Closed { clean: false });
                    return;
                }
                None => {
                    report(SocketEvent::Closed { clean: false });
                    return;
                }
            },
        }
    }
}
