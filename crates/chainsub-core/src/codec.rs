//! Frame codec: outbound requests to text, inbound text to [`InboundFrame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;
use crate::event::{EventData, EventIndex, TxResult};
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// `result` of a data-bearing frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The query the node matched, echoed back.
    #[serde(default)]
    pub query: Option<String>,
    pub data: EventData,
    #[serde(default)]
    pub events: EventIndex,
}

/// What an inbound frame carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Subscribe/unsubscribe acknowledgement with an empty result.
    Ack,
    /// A non-transaction event (`NewBlock`, `NewBlockHeader`, ...).
    Event(EventEnvelope),
    /// A transaction event with its decoded result.
    Tx {
        envelope: EventEnvelope,
        result: TxResult,
    },
    /// The node rejected the request.
    Error(JsonRpcError),
}

impl Payload {
    /// The data envelope, for frames that carry one.
    pub fn envelope(&self) -> Option<&EventEnvelope> {
        match self {
            Self::Event(envelope) | Self::Tx { envelope, .. } => Some(envelope),
            Self::Ack | Self::Error(_) => None,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Correlation id of the request this frame answers.
    pub id: u64,
    pub payload: Payload,
    /// The frame exactly as parsed.
    pub raw: Value,
}

/// Serialize an outbound request.
pub fn encode_request(req: &JsonRpcRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(req)?)
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<InboundFrame, CodecError> {
    let raw: Value = serde_json::from_str(text)?;
    let resp: JsonRpcResponse = serde_json::from_value(raw.clone())?;
    let id = resp.id;

    let payload = match resp.into_result() {
        Err(error) => Payload::Error(error),
        Ok(result) => decode_result(result)?,
    };

    Ok(InboundFrame { id, payload, raw })
}

fn decode_result(result: Value) -> Result<Payload, CodecError> {
    let has_data = result
        .get("data")
        .map(|d| !d.is_null())
        .unwrap_or(false);
    if !has_data {
        return Ok(Payload::Ack);
    }

    let envelope: EventEnvelope = serde_json::from_value(result)?;
    if envelope.data.is_tx() {
        let result = envelope.data.tx_result()?;
        Ok(Payload::Tx { envelope, result })
    } else {
        Ok(Payload::Event(envelope))
    }
}
