//! Inbound frame routing.
//!
//! Every frame carries the correlation id of the request it answers. The
//! router resolves that id to a group, updates the group's status through
//! the registry, and for data frames fans the decoded events out to the
//! group's callbacks.

use chainsub_core::{
    decode_frame, AttributeEncoding, InboundFrame, JsonRpcError, Payload, Query,
    UNSUBSCRIBE_ALL_ID,
};

use crate::listener::invoke_isolated;
use crate::registry::{CallbackWrapper, FailedRequest, GroupStatus, Registry};

/// Attribute that carries the message action of an embedded event.
pub const ACTION_ATTRIBUTE: &str = "action";

/// What the router did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Routed {
    /// Frame could not be decoded or referenced an unknown id.
    Dropped,
    /// Global unsubscribe acknowledged.
    UnsubscribedAll,
    /// Bare acknowledgement; the group moved to `status`.
    Acknowledged { query: Query, status: GroupStatus },
    /// The node rejected a subscribe or unsubscribe.
    Failed { failed: FailedRequest, error: JsonRpcError },
    /// Data frame fanned out to `deliveries` callback invocations.
    Delivered { query: Query, deliveries: usize },
}

/// Route one inbound text frame.
pub(crate) fn route(registry: &mut Registry, text: &str, encoding: AttributeEncoding) -> Routed {
    let frame = match decode_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable frame");
            return Routed::Dropped;
        }
    };

    if frame.id == UNSUBSCRIBE_ALL_ID {
        tracing::debug!("unsubscribe-all acknowledged");
        registry.acknowledge_unsubscribe_all();
        return Routed::UnsubscribedAll;
    }

    let Some(group) = registry.resolve(frame.id) else {
        tracing::warn!(id = frame.id, "frame for unknown subscription id");
        return Routed::Dropped;
    };
    let query = group.query().clone();

    match &frame.payload {
        Payload::Error(error) => match registry.fail(frame.id) {
            Some(failed) => {
                tracing::warn!(id = frame.id, %query, subscribe = failed.subscribe, %error, "node rejected request");
                Routed::Failed {
                    failed,
                    error: error.clone(),
                }
            }
            None => Routed::Dropped,
        },
        Payload::Ack => {
            let status = registry
                .acknowledge(frame.id)
                .unwrap_or(GroupStatus::Disconnected);
            tracing::debug!(id = frame.id, %query, %status, "acknowledged");
            Routed::Acknowledged { query, status }
        }
        Payload::Event(_) | Payload::Tx { .. } => {
            // snapshot: callbacks may re-enter the manager while we dispatch
            let callbacks = group.callbacks().to_vec();
            let deliveries = dispatch(&callbacks, &frame, encoding);
            Routed::Delivered { query, deliveries }
        }
    }
}

/// Fan a data frame out to `callbacks`. Returns the number of invocations.
pub(crate) fn dispatch(
    callbacks: &[CallbackWrapper],
    frame: &InboundFrame,
    encoding: AttributeEncoding,
) -> usize {
    let mut deliveries = 0;

    if let Payload::Tx { result, .. } = &frame.payload {
        for event in result.events() {
            let attributes = match event.decode_attributes(encoding) {
                Ok(attributes) => attributes,
                Err(e) => {
                    tracing::warn!(error = %e, kind = %event.kind, "skipping undecodable event");
                    continue;
                }
            };
            let action = attributes.get(ACTION_ATTRIBUTE).map(String::as_str);

            for callback in callbacks {
                let CallbackWrapper::Message { listener, action: filter } = callback else {
                    continue;
                };
                if filter.is_some() && filter.as_deref() != action {
                    continue;
                }
                invoke_isolated("message", || listener.call(&attributes));
                deliveries += 1;
            }
        }
    }

    for callback in callbacks {
        if let CallbackWrapper::Generic(listener) = callback {
            invoke_isolated("generic", || listener.call(frame));
            deliveries += 1;
        }
    }

    deliveries
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chainsub_core::{Attributes, EventType, SubscriptionOptions};
    use serde_json::json;

    use super::*;
    use crate::listener::{EventListener, MessageListener};

    fn tx_query() -> Query {
        Query::new(Some(&EventType::Tx), &SubscriptionOptions::default())
    }

    fn tx_frame(id: u64, events: &[&[(&str, &str)]]) -> String {
        let events: Vec<_> = events
            .iter()
            .map(|attrs| {
                let attributes: Vec<_> = attrs
                    .iter()
                    .map(|(k, v)| json!({ "key": STANDARD.encode(k), "value": STANDARD.encode(v) }))
                    .collect();
                json!({ "type": "message", "attributes": attributes })
            })
            .collect();
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "query": "tm.event='Tx'",
                "data": { "type": "tendermint/event/Tx", "value": { "TxResult": { "result": { "events": events } } } },
                "events": { "tm.event": ["Tx"] }
            }
        })
        .to_string()
    }

    fn recording(filter: Option<&str>) -> (CallbackWrapper, Arc<Mutex<Vec<Attributes>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = MessageListener::new(move |attrs| sink.lock().unwrap().push(attrs.clone()));
        let callback = CallbackWrapper::Message {
            listener,
            action: filter.map(String::from),
        };
        (callback, seen)
    }

    fn subscribed(registry: &mut Registry, callback: CallbackWrapper) -> u64 {
        registry.subscribe(tx_query(), callback, true);
        registry.group(&tx_query()).unwrap().subscribe_id()
    }

    #[test]
    fn filters_on_action() {
        let mut registry = Registry::new();
        let (test_cb, test_seen) = recording(Some("Test"));
        let (all_cb, all_seen) = recording(None);
        let id = subscribed(&mut registry, test_cb);
        registry.subscribe(tx_query(), all_cb, true);

        let frame = tx_frame(id, &[&[("action", "Test"), ("Token0", "A")], &[("action", "Other")], &[("sender", "x")]]);
        let routed = route(&mut registry, &frame, AttributeEncoding::Base64);

        assert_eq!(routed, Routed::Delivered { query: tx_query(), deliveries: 4 });
        let test_seen = test_seen.lock().unwrap();
        assert_eq!(test_seen.len(), 1);
        assert_eq!(test_seen[0]["action"], "Test");
        assert_eq!(test_seen[0]["Token0"], "A");
        assert_eq!(all_seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn generic_listener_once_per_frame() {
        let mut registry = Registry::new();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        let generic = EventListener::new(move |frame| sink.lock().unwrap().push(frame.id));
        let id = subscribed(&mut registry, CallbackWrapper::Generic(generic));

        let frame = tx_frame(id, &[&[("action", "a")], &[("action", "b")]]);
        route(&mut registry, &frame, AttributeEncoding::Base64);

        assert_eq!(*frames.lock().unwrap(), vec![id]);
    }

    #[test]
    fn panicking_callback_does_not_stop_fan_out() {
        let mut registry = Registry::new();
        let boom = MessageListener::new(|_| panic!("listener bug"));
        let id = subscribed(
            &mut registry,
            CallbackWrapper::Message { listener: boom, action: None },
        );
        let (cb, seen) = recording(None);
        registry.subscribe(tx_query(), cb, true);

        route(&mut registry, &tx_frame(id, &[&[("action", "x")]]), AttributeEncoding::Base64);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn ack_connects_group() {
        let mut registry = Registry::new();
        let (cb, _) = recording(None);
        let id = subscribed(&mut registry, cb);
        let routed = route(&mut registry, &json!({"jsonrpc":"2.0","id":id,"result":{}}).to_string(), AttributeEncoding::Base64);
        assert_eq!(routed, Routed::Acknowledged { query: tx_query(), status: GroupStatus::Connected });
        assert_eq!(registry.status(&tx_query()), Some(GroupStatus::Connected));
    }

    #[test]
    fn unknown_id_is_dropped() {
        let mut registry = Registry::new();
        let (cb, seen) = recording(None);
        subscribed(&mut registry, cb);

        let routed = route(&mut registry, &tx_frame(4242, &[&[("action", "x")]]), AttributeEncoding::Base64);
        assert_eq!(routed, Routed::Dropped);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(registry.status(&tx_query()), Some(GroupStatus::Connecting));
    }

    #[test]
    fn error_frame_is_reported() {
        let mut registry = Registry::new();
        let (cb, _) = recording(None);
        let id = subscribed(&mut registry, cb);
        let text = json!({"jsonrpc":"2.0","id":id,"error":{"code":-32603,"message":"Internal error"}}).to_string();

        match route(&mut registry, &text, AttributeEncoding::Base64) {
            Routed::Failed { failed, error } => {
                assert_eq!(failed.query, tx_query());
                assert!(failed.subscribe);
                assert_eq!(error.code, -32603);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_dropped() {
        let mut registry = Registry::new();
        assert_eq!(route(&mut registry, "{", AttributeEncoding::Base64), Routed::Dropped);
    }
}
