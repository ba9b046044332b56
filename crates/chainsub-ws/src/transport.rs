//! Socket abstraction.
//!
//! The manager never touches `tokio-tungstenite` directly: it asks a
//! [`Connector`] for a frame sink and a frame stream. [`WsConnector`] is the
//! production implementation; tests plug in a channel-backed double.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use chainsub_core::TransportError;

/// One item read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The peer sent a Close frame. `clean` is `true` for a normal closure.
    Close { clean: bool },
}

/// Outbound half of a connection: text frames in.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound, TransportError>> + Send>>;

/// Opens physical connections to the event source.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection.
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError>;

    /// Endpoint identifier (URL), for logging.
    fn url(&self) -> &str;
}

/// `tokio-tungstenite` connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        let (sink, stream) = ws_stream.split();

        let sink: FrameSink = Box::pin(
            sink.sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into())))),
        );

        let stream: FrameStream = Box::pin(stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.to_string()))),
                Ok(Message::Close(frame)) => Some(Ok(Inbound::Close {
                    clean: frame.map_or(true, |f| f.code == CloseCode::Normal),
                })),
                // ping/pong are answered by tungstenite, binary is not used
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            })
        }));

        Ok((sink, stream))
    }

    fn url(&self) -> &str {
        &self.url
    }
}
