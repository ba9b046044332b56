//! chainsub-core — wire types and canonical queries for chainsub.
//!
//! # Overview
//!
//! chainsub multiplexes many event subscriptions over a single Tendermint
//! `/websocket` connection. The core crate is I/O free and defines:
//!
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`codec`]: frame encoding and decoding into [`Payload`]
//! - [`Query`]: canonical, order-stable subscription queries
//! - [`event`]: transaction results and attribute decoding
//! - [`Backoff`]: reconnect interval policy
//! - [`IdAllocator`]: correlation id space
//! - [`error`]: transport, codec and usage errors

pub mod backoff;
pub mod codec;
pub mod error;
pub mod event;
pub mod ids;
pub mod query;
pub mod request;

pub use backoff::{Backoff, BackoffConfig};
pub use codec::{decode_frame, encode_request, EventEnvelope, InboundFrame, Payload};
pub use error::{CodecError, SubscriptionError, TransportError};
pub use event::{AbciEvent, AttributeEncoding, Attributes, EventData, EventIndex, TxResult};
pub use ids::{IdAllocator, UNSUBSCRIBE_ALL_ID};
pub use query::{EventType, Query, SubscriptionOptions};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Method};
