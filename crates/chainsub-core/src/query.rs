//! Canonical subscription queries.
//!
//! Two requests that resolve to the same set of clauses must produce the
//! same [`Query`] string, otherwise they would not coalesce into one group
//! on the node. Clauses are therefore always emitted in a fixed dimension
//! order, regardless of how the options were assembled.

use serde::{Deserialize, Serialize};

const EVENT_TYPE_KEY: &str = "tm.event";
const MESSAGE_ACTION_KEY: &str = "message.action";
const TX_HASH_KEY: &str = "tx.hash";
const BLOCK_HEIGHT_KEY: &str = "block.height";
const INDEXING_HEIGHT_KEY: &str = "tx.height";

/// Value of the `tm.event` dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Tx,
    NewBlock,
    NewBlockHeader,
    NewEvidence,
    ValidatorSetUpdates,
    /// Any other event type the node publishes.
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tx => "Tx",
            Self::NewBlock => "NewBlock",
            Self::NewBlockHeader => "NewBlockHeader",
            Self::NewEvidence => "NewEvidence",
            Self::ValidatorSetUpdates => "ValidatorSetUpdates",
            Self::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Tx" => Self::Tx,
            "NewBlock" => Self::NewBlock,
            "NewBlockHeader" => Self::NewBlockHeader,
            "NewEvidence" => Self::NewEvidence,
            "ValidatorSetUpdates" => Self::ValidatorSetUpdates,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// Optional filter dimensions beyond the event type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// `message.action` clause; also the action filter for message listeners.
    #[serde(default)]
    pub message_action: Option<String>,
    /// `tx.hash` clause.
    #[serde(default)]
    pub hash_key: Option<String>,
    /// `block.height` clause.
    #[serde(default)]
    pub block_height: Option<u64>,
    /// `tx.height` clause.
    #[serde(default)]
    pub indexing_height: Option<u64>,
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_action(mut self, action: impl Into<String>) -> Self {
        self.message_action = Some(action.into());
        self
    }

    pub fn hash_key(mut self, hash: impl Into<String>) -> Self {
        self.hash_key = Some(hash.into());
        self
    }

    pub fn block_height(mut self, height: u64) -> Self {
        self.block_height = Some(height);
        self
    }

    pub fn indexing_height(mut self, height: u64) -> Self {
        self.indexing_height = Some(height);
        self
    }
}

/// A canonical query string, e.g. `tm.event='Tx' AND message.action='swap'`.
///
/// The empty query subscribes to everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Build the canonical query for an event type and filter options.
    ///
    /// Clauses are emitted in the order event type, message action, tx hash,
    /// block height, indexing height. Empty strings and zero heights are
    /// treated as absent.
    pub fn new(event_type: Option<&EventType>, options: &SubscriptionOptions) -> Self {
        let height = |h: Option<u64>| h.filter(|h| *h != 0).map(|h| h.to_string());

        let dimensions = [
            (EVENT_TYPE_KEY, event_type.map(|e| e.as_str().to_string())),
            (MESSAGE_ACTION_KEY, options.message_action.clone()),
            (TX_HASH_KEY, options.hash_key.clone()),
            (BLOCK_HEIGHT_KEY, height(options.block_height)),
            (INDEXING_HEIGHT_KEY, height(options.indexing_height)),
        ];

        let clauses: Vec<String> = dimensions
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{key}='{v}'"))
            })
            .collect();

        Self(clauses.join(" AND "))
    }

    /// The subscribe-to-everything query.
    pub fn wildcard() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Query {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
