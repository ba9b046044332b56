//! Subscription manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chainsub_core::{AttributeEncoding, BackoffConfig};

/// Configuration for a [`SubscriptionManager`](crate::SubscriptionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Event endpoint, e.g. "wss://rpc.example.com/websocket"
    #[serde(default = "default_url")]
    pub url: String,
    /// Reconnect backoff floor in milliseconds
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Reconnect backoff ceiling in milliseconds
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Delay before empty groups are unsubscribed, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Wire encoding of event attributes
    #[serde(default)]
    pub attribute_encoding: AttributeEncoding,
}

fn default_url() -> String { "ws://localhost:26657/websocket".into() }
fn default_reconnect_initial_ms() -> u64 { 1_000 }
fn default_reconnect_max_ms() -> u64 { 30_000 }
fn default_debounce_ms() -> u64 { 1_000 }

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            debounce_ms: default_debounce_ms(),
            attribute_encoding: AttributeEncoding::default(),
        }
    }
}

impl ManagerConfig {
    /// Default settings against `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            ..BackoffConfig::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: ManagerConfig =
            serde_json::from_str(r#"{"url":"wss://node/websocket","attribute_encoding":"plain"}"#).unwrap();
        assert_eq!(cfg.url, "wss://node/websocket");
        assert_eq!(cfg.debounce(), Duration::from_secs(1));
        assert_eq!(cfg.attribute_encoding, AttributeEncoding::Plain);
        assert_eq!(cfg.backoff().initial, Duration::from_secs(1));
        assert_eq!(cfg.backoff().max, Duration::from_secs(30));
    }

    #[test]
    fn ceiling_never_below_floor() {
        let cfg = ManagerConfig {
            reconnect_initial_ms: 5_000,
            reconnect_max_ms: 100,
            ..ManagerConfig::default()
        };
        assert_eq!(cfg.backoff().max, Duration::from_secs(5));
    }
}
