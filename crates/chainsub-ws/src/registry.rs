//! Subscription registry.
//!
//! Maps each canonical [`Query`] to a [`SubscriptionGroup`]: the callbacks
//! sharing that query, the two correlation ids used to talk to the node
//! about it, and where the group is in its subscribe/unsubscribe cycle.
//!
//! The registry performs no I/O. Operations that need a frame on the wire
//! return the [`JsonRpcRequest`]s to send; the manager task sends them.

use std::collections::{BTreeMap, HashMap};

use chainsub_core::{IdAllocator, JsonRpcRequest, Query};

use crate::listener::{EventListener, ListenerRef, MessageListener};

/// Where a group is in its subscribe/unsubscribe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// A registered callback.
#[derive(Debug, Clone)]
pub enum CallbackWrapper {
    /// Receives every data frame of the group.
    Generic(EventListener),
    /// Receives the attribute map of each embedded event whose `action`
    /// matches, or of every event when `action` is `None`.
    Message {
        listener: MessageListener,
        action: Option<String>,
    },
}

impl CallbackWrapper {
    pub(crate) fn is(&self, listener: &ListenerRef) -> bool {
        match (self, listener) {
            (Self::Generic(a), ListenerRef::Generic(b)) => a == b,
            (Self::Message { listener: a, .. }, ListenerRef::Message(b)) => a == b,
            _ => false,
        }
    }
}

/// Callbacks sharing one query on the node.
#[derive(Debug, Clone)]
pub struct SubscriptionGroup {
    query: Query,
    subscribe_id: u64,
    unsubscribe_id: u64,
    status: GroupStatus,
    callbacks: Vec<CallbackWrapper>,
}

impl SubscriptionGroup {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn subscribe_id(&self) -> u64 {
        self.subscribe_id
    }

    pub fn unsubscribe_id(&self) -> u64 {
        self.unsubscribe_id
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn callbacks(&self) -> &[CallbackWrapper] {
        &self.callbacks
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn subscribe_request(&mut self) -> JsonRpcRequest {
        self.status = GroupStatus::Connecting;
        JsonRpcRequest::subscribe(self.subscribe_id, self.query.as_str())
    }

    fn unsubscribe_request(&mut self) -> JsonRpcRequest {
        self.status = GroupStatus::Disconnecting;
        JsonRpcRequest::unsubscribe(self.unsubscribe_id, self.query.as_str())
    }
}

/// Outcome of a failed request, see [`Registry::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub query: Query,
    /// `true` if the failed request was the subscribe, `false` for unsubscribe.
    pub subscribe: bool,
}

/// Owns every subscription group and the correlation id map.
#[derive(Debug, Default)]
pub struct Registry {
    groups: BTreeMap<Query, SubscriptionGroup>,
    id_to_group: HashMap<u64, Query>,
    ids: IdAllocator,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback to the group for `query`, creating it if needed.
    ///
    /// Returns the subscribe request to send when `connected` and the group
    /// is not already subscribed or subscribing.
    pub fn subscribe(
        &mut self,
        query: Query,
        callback: CallbackWrapper,
        connected: bool,
    ) -> Option<JsonRpcRequest> {
        let ids = &mut self.ids;
        let group = self.groups.entry(query.clone()).or_insert_with(|| {
            let subscribe_id = ids.next_id();
            let unsubscribe_id = ids.next_id();
            tracing::debug!(%query, subscribe_id, unsubscribe_id, "new subscription group");
            SubscriptionGroup {
                query: query.clone(),
                subscribe_id,
                unsubscribe_id,
                status: GroupStatus::Disconnected,
                callbacks: Vec::new(),
            }
        });
        group.callbacks.push(callback);
        self.id_to_group.insert(group.subscribe_id, query.clone());
        self.id_to_group.insert(group.unsubscribe_id, query);

        let idle = matches!(
            group.status,
            GroupStatus::Disconnected | GroupStatus::Disconnecting
        );
        (connected && idle).then(|| group.subscribe_request())
    }

    /// Remove every callback registered by `listener`, from the group for
    /// `query` or from all groups when `query` is `None`.
    ///
    /// Groups are kept even when they become empty; see [`Registry::sweep`].
    pub fn unsubscribe(&mut self, query: Option<&Query>, listener: &ListenerRef) -> usize {
        let mut removed = 0;
        for group in self.groups.values_mut() {
            if query.map_or(false, |q| q != &group.query) {
                continue;
            }
            let before = group.callbacks.len();
            group.callbacks.retain(|cb| !cb.is(listener));
            removed += before - group.callbacks.len();
        }
        removed
    }

    /// Remove every callback from every group.
    pub fn clear_callbacks(&mut self) {
        for group in self.groups.values_mut() {
            group.callbacks.clear();
        }
    }

    pub fn has_empty_groups(&self) -> bool {
        self.groups.values().any(SubscriptionGroup::is_empty)
    }

    /// Debounced teardown: unsubscribe every empty group from the node.
    ///
    /// Empty groups the node never acknowledged are dropped outright; groups
    /// already being torn down are left alone.
    pub fn sweep(&mut self) -> Vec<JsonRpcRequest> {
        let mut requests = Vec::new();
        let mut dropped = Vec::new();
        for group in self.groups.values_mut().filter(|g| g.is_empty()) {
            match group.status {
                GroupStatus::Connecting | GroupStatus::Connected => {
                    requests.push(group.unsubscribe_request());
                }
                GroupStatus::Disconnected => dropped.push(group.query.clone()),
                GroupStatus::Disconnecting => {}
            }
        }
        for query in dropped {
            self.remove(&query);
        }
        requests
    }

    /// Drop every empty group immediately (no socket to unsubscribe on).
    pub fn drop_empty_groups(&mut self) {
        let empty: Vec<Query> = self
            .groups
            .values()
            .filter(|g| g.is_empty())
            .map(|g| g.query.clone())
            .collect();
        for query in empty {
            self.remove(&query);
        }
    }

    /// A new socket opened: regenerate every group's ids and return the
    /// subscribe requests to replay.
    pub fn reset_ids(&mut self) -> Vec<JsonRpcRequest> {
        self.id_to_group.clear();
        let mut requests = Vec::new();
        for group in self.groups.values_mut() {
            group.subscribe_id = self.ids.next_id();
            group.unsubscribe_id = self.ids.next_id();
            self.id_to_group.insert(group.subscribe_id, group.query.clone());
            self.id_to_group.insert(group.unsubscribe_id, group.query.clone());
            if !group.is_empty() && group.status == GroupStatus::Disconnected {
                requests.push(group.subscribe_request());
            }
        }
        requests
    }

    /// The socket closed: every group is disconnected, callbacks are kept
    /// for the next connection, empty groups are dropped.
    pub fn mark_all_disconnected(&mut self) {
        for group in self.groups.values_mut() {
            group.status = GroupStatus::Disconnected;
        }
        self.drop_empty_groups();
    }

    /// Forget every group and id.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.id_to_group.clear();
    }

    /// Resolve a correlation id to its group.
    pub fn resolve(&self, id: u64) -> Option<&SubscriptionGroup> {
        self.id_to_group
            .get(&id)
            .and_then(|query| self.groups.get(query))
    }

    /// Apply a bare acknowledgement for `id`.
    ///
    /// An unsubscribe ack disconnects the group (and drops it if still
    /// empty); any other ack means the node holds the subscription.
    pub fn acknowledge(&mut self, id: u64) -> Option<GroupStatus> {
        let query = self.id_to_group.get(&id)?.clone();
        let group = self.groups.get_mut(&query)?;
        if id == group.unsubscribe_id {
            group.status = GroupStatus::Disconnected;
            if group.is_empty() {
                self.remove(&query);
            }
            Some(GroupStatus::Disconnected)
        } else {
            group.status = GroupStatus::Connected;
            Some(GroupStatus::Connected)
        }
    }

    /// The node acknowledged a global unsubscribe.
    pub fn acknowledge_unsubscribe_all(&mut self) {
        for group in self.groups.values_mut() {
            if group.status == GroupStatus::Disconnecting {
                group.status = GroupStatus::Disconnected;
            }
        }
        self.id_to_group.clear();
        self.drop_empty_groups();
    }

    /// The node rejected the request sent with `id`.
    ///
    /// A failed subscribe leaves the group `Disconnected` so the next
    /// connection replays it. A failed unsubscribe means the node holds no
    /// such subscription, so an empty group is dropped.
    pub fn fail(&mut self, id: u64) -> Option<FailedRequest> {
        let query = self.id_to_group.get(&id)?.clone();
        let group = self.groups.get_mut(&query)?;
        let subscribe = id == group.subscribe_id;
        if subscribe {
            if group.status == GroupStatus::Connecting {
                group.status = GroupStatus::Disconnected;
            }
        } else if group.is_empty() {
            self.remove(&query);
        }
        Some(FailedRequest { query, subscribe })
    }

    pub fn group(&self, query: &Query) -> Option<&SubscriptionGroup> {
        self.groups.get(query)
    }

    pub fn status(&self, query: &Query) -> Option<GroupStatus> {
        self.groups.get(query).map(|g| g.status)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn remove(&mut self, query: &Query) {
        if let Some(group) = self.groups.remove(query) {
            self.id_to_group.remove(&group.subscribe_id);
            self.id_to_group.remove(&group.unsubscribe_id);
            tracing::debug!(%query, "subscription group removed");
        }
    }
}
