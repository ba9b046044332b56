//! Error types shared by every chainsub crate.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Socket-level failures. These never reach subscribe/unsubscribe callers;
/// they are forwarded to the manager's error listeners.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not establish the WebSocket connection.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// WebSocket send/receive error on an established connection.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The node returned a JSON-RPC error frame.
    #[error("RPC error on query {query:?}: {error}")]
    Rpc { query: String, error: JsonRpcError },

    /// Socket closed before an operation could complete.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if the error was raised by the transport itself
    /// (and is therefore recovered by reconnecting).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::WebSocket(_) | Self::Closed)
    }

    /// Returns `true` if this is a node-side protocol error.
    pub fn is_rpc_error(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }
}

/// Failure to decode a single inbound frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 in attribute {field}: {reason}")]
    Base64 { field: &'static str, reason: String },

    #[error("attribute {field} is not valid UTF-8")]
    Utf8 { field: &'static str },
}

/// Usage errors returned straight to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// `open()` called while a socket already exists.
    #[error("connection is already open")]
    AlreadyOpen,

    /// A frame was sent while no socket is open.
    #[error("connection is not open")]
    NotConnected,

    /// The manager task has shut down.
    #[error("subscription manager is closed")]
    ManagerClosed,

    /// A request could not be serialized.
    #[error("request could not be encoded: {0}")]
    Encode(String),
}

impl From<CodecError> for SubscriptionError {
    fn from(e: CodecError) -> Self {
        Self::Encode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_failures_are_retryable() {
        let connect = TransportError::Connect {
            url: "ws://node".into(),
            reason: "refused".into(),
        };
        assert!(connect.is_retryable());
        assert!(TransportError::WebSocket("reset".into()).is_retryable());
        assert!(TransportError::Closed.is_retryable());
        assert!(!connect.is_rpc_error());
    }

    #[test]
    fn node_rejection_is_not_retryable() {
        let err = TransportError::Rpc {
            query: "tm.event='Tx'".into(),
            error: JsonRpcError {
                code: -32603,
                message: "already subscribed".into(),
                data: None,
            },
        };
        assert!(err.is_rpc_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn codec_failure_keeps_its_cause() {
        let err = SubscriptionError::from(CodecError::Utf8 { field: "key" });
        assert_eq!(
            err,
            SubscriptionError::Encode("attribute key is not valid UTF-8".into())
        );
        assert_ne!(err, SubscriptionError::NotConnected);
    }
}
