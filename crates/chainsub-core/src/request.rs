//! JSON-RPC 2.0 wire types for the Tendermint event endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subscription methods understood by the node's `/websocket` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Subscribe,
    Unsubscribe,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe => write!(f, "subscribe"),
            Self::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

/// An outbound JSON-RPC 2.0 request.
///
/// `params` is skipped entirely for a global unsubscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    pub id: u64,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: Method, params: Option<Vec<String>>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method,
            params,
            id,
        }
    }

    /// `subscribe` for a single query.
    pub fn subscribe(id: u64, query: impl Into<String>) -> Self {
        Self::new(id, Method::Subscribe, Some(vec![query.into()]))
    }

    /// `unsubscribe` for a single query.
    pub fn unsubscribe(id: u64, query: impl Into<String>) -> Self {
        Self::new(id, Method::Unsubscribe, Some(vec![query.into()]))
    }

    /// Global `unsubscribe` with no params.
    pub fn unsubscribe_all(id: u64) -> Self {
        Self::new(id, Method::Unsubscribe, None)
    }

    /// The query this request targets, if any.
    pub fn query(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.first())
            .map(String::as_str)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)?;
        if let Some(Value::String(data)) = &self.data {
            write!(f, " ({data})")?;
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 response as it arrives over the socket.
///
/// Tendermint sends both acknowledgements and event notifications as
/// responses carrying the id of the originating `subscribe` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the result value or return an error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_serialization() {
        let req = JsonRpcRequest::subscribe(7, "tm.event='Tx'");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "params": ["tm.event='Tx'"],
                "id": 7
            })
        );
    }

    #[test]
    fn global_unsubscribe_omits_params() {
        let req = JsonRpcRequest::unsubscribe_all(1);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"method\":\"unsubscribe\""));
        assert!(!json.contains("params"));
        assert_eq!(req.query(), None);
    }

    #[test]
    fn response_into_result_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32603,"message":"Internal error","data":"already subscribed"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32603);
        assert_eq!(err.to_string(), "JSON-RPC error -32603: Internal error (already subscribed)");
    }
}
