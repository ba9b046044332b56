//! Listener handles.
//!
//! Subscription listeners are reference-counted closures. Cloning a handle
//! keeps its identity, so the same handle passed to `subscribe` and later to
//! `unsubscribe` removes exactly the callbacks it registered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chainsub_core::{Attributes, InboundFrame, TransportError};

/// Receives the flattened attribute map of every matching embedded event.
#[derive(Clone)]
pub struct MessageListener(Arc<dyn Fn(&Attributes) + Send + Sync>);

impl MessageListener {
    pub fn new(f: impl Fn(&Attributes) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, attributes: &Attributes) {
        (self.0)(attributes)
    }
}

impl PartialEq for MessageListener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MessageListener {}

impl std::fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MessageListener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Receives every data frame of its group, once per frame.
#[derive(Clone)]
pub struct EventListener(Arc<dyn Fn(&InboundFrame) + Send + Sync>);

impl EventListener {
    pub fn new(f: impl Fn(&InboundFrame) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, frame: &InboundFrame) {
        (self.0)(frame)
    }
}

impl PartialEq for EventListener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EventListener {}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventListener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Either kind of subscription listener, used to remove callbacks by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerRef {
    Generic(EventListener),
    Message(MessageListener),
}

/// Connection-level lifecycle event.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The socket is open and subscriptions have been replayed.
    Open,
    /// Transport failure or a node-side error frame.
    Error(TransportError),
    /// The socket closed. Unclean closes are followed by a reconnect.
    Close { clean: bool },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleKind {
        match self {
            Self::Open => LifecycleKind::Open,
            Self::Error(_) => LifecycleKind::Error,
            Self::Close { .. } => LifecycleKind::Close,
        }
    }
}

/// Which lifecycle events a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Open,
    Error,
    Close,
}

/// Handle returned by `add_listener`, accepted by `remove_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

pub(crate) type LifecycleCallback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Run a listener, logging instead of unwinding if it panics.
pub(crate) fn invoke_isolated(listener: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(listener, %reason, "listener panicked");
    }
}
