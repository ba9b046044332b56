//! chainsub-ws — multiplexed Tendermint event subscriptions over WebSocket.
//!
//! # Features
//! - One socket shared by any number of subscriptions
//! - Identical queries coalesce into one reference-counted group
//! - Debounced unsubscribe of groups that lose their last listener
//! - Auto-reconnect (exponential backoff) with full resubscription replay
//! - Per-listener filtering on the embedded events' `action` attribute
//!
//! ```no_run
//! use chainsub_core::{EventType, SubscriptionOptions};
//! use chainsub_ws::{ManagerConfig, MessageListener, SubscriptionManager};
//!
//! # async fn run() {
//! let manager = SubscriptionManager::new(ManagerConfig::for_url("wss://rpc.example.com/websocket"));
//! let listener = MessageListener::new(|attrs| println!("{attrs:?}"));
//! manager
//!     .subscribe_message(listener, EventType::Tx, SubscriptionOptions::new().message_action("swap"))
//!     .unwrap();
//! # }
//! ```

pub mod config;
mod connection;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod router;
mod timer;
pub mod transport;

pub use config::ManagerConfig;
pub use listener::{
    EventListener, LifecycleEvent, LifecycleKind, ListenerHandle, ListenerRef, MessageListener,
};
pub use manager::SubscriptionManager;
pub use registry::{CallbackWrapper, GroupStatus, Registry, SubscriptionGroup};
pub use transport::{Connector, FrameSink, FrameStream, Inbound, WsConnector};
