//! Decoded event payloads.
//!
//! ## Data frame layout
//! ```text
//! result.data.type                       "tendermint/event/Tx" | "tendermint/event/NewBlock" | ...
//! result.data.value.TxResult.result.events[]
//!     .type                              ABCI event type ("message", "transfer", ...)
//!     .attributes[] { key, value }       base64 UTF-8 (Tendermint <= 0.34)
//! result.events                          "composite.key" -> [values], indexed metadata
//! ```

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// `result.data.type` of a transaction event.
pub const TX_EVENT_TYPE: &str = "tendermint/event/Tx";

/// Flattened `key → value` map of one ABCI event's attributes.
pub type Attributes = HashMap<String, String>;

/// Indexed attribute groups from `result.events`, e.g. `"tx.hash" → ["AB12.."]`.
pub type EventIndex = HashMap<String, Vec<String>>;

/// How attribute keys and values are encoded on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeEncoding {
    /// Base64-encoded UTF-8 (Tendermint 0.34 and earlier).
    #[default]
    Base64,
    /// Plain strings (CometBFT 0.37+).
    Plain,
}

/// `result.data`: a tagged event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl EventData {
    pub fn is_tx(&self) -> bool {
        self.kind == TX_EVENT_TYPE
    }

    /// Parse `value.TxResult`. Only meaningful when [`is_tx`](Self::is_tx).
    pub fn tx_result(&self) -> Result<TxResult, CodecError> {
        #[derive(Deserialize)]
        struct TxValue {
            #[serde(rename = "TxResult")]
            tx_result: TxResult,
        }
        let value: TxValue = serde_json::from_value(self.value.clone())?;
        Ok(value.tx_result)
    }
}

/// A transaction result as published with `tm.event='Tx'`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    /// Raw transaction bytes, base64.
    #[serde(default)]
    pub tx: Option<String>,
    #[serde(default)]
    pub result: ExecTxResult,
}

impl TxResult {
    pub fn events(&self) -> &[AbciEvent] {
        &self.result.events
    }
}

/// Execution outcome of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecTxResult {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// One ABCI event embedded in a transaction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    /// Decode every attribute into a flat map. Later duplicates win.
    pub fn decode_attributes(&self, encoding: AttributeEncoding) -> Result<Attributes, CodecError> {
        self.attributes
            .iter()
            .map(|attr| attr.decode(encoding))
            .collect()
    }
}

/// A single `{key, value}` attribute pair as sent by the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
}

impl EventAttribute {
    /// Decode the key and value according to `encoding`.
    pub fn decode(&self, encoding: AttributeEncoding) -> Result<(String, String), CodecError> {
        let value = self.value.as_deref().unwrap_or_default();
        match encoding {
            AttributeEncoding::Plain => Ok((self.key.clone(), value.to_string())),
            AttributeEncoding::Base64 => Ok((
                decode_base64("key", &self.key)?,
                decode_base64("value", value)?,
            )),
        }
    }
}

fn decode_base64(field: &'static str, s: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(s).map_err(|e| CodecError::Base64 {
        field,
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|_| CodecError::Utf8 { field })
}
