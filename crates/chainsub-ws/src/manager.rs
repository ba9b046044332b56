//! Subscription manager: the public facade and the task behind it.
//!
//! [`SubscriptionManager`] is a cheap, cloneable handle. Every call is turned
//! into a [`Command`] for a background task that exclusively owns the
//! registry, the socket and the timers, so all state changes happen on one
//! task in arrival order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use chainsub_core::{
    Attributes, Backoff, EventType, JsonRpcRequest, Query, SubscriptionError,
    SubscriptionOptions, TransportError, UNSUBSCRIBE_ALL_ID,
};

use crate::config::ManagerConfig;
use crate::connection::{Connection, SocketEvent, TaggedEvent};
use crate::listener::{
    invoke_isolated, EventListener, LifecycleCallback, LifecycleEvent, LifecycleKind,
    ListenerHandle, ListenerRef, MessageListener,
};
use crate::registry::{CallbackWrapper, GroupStatus, Registry};
use crate::router::{self, Routed};
use crate::timer::{TimerFired, TimerKind, TimerSlot};
use crate::transport::{Connector, WsConnector};

/// Command sent from the facade to the manager task.
enum Command {
    Open {
        reply: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        query: Query,
        callback: CallbackWrapper,
    },
    Unsubscribe {
        query: Option<Query>,
        listener: ListenerRef,
    },
    UnsubscribeAll,
    AddListener {
        handle: ListenerHandle,
        kind: LifecycleKind,
        callback: LifecycleCallback,
    },
    RemoveListener {
        handle: ListenerHandle,
    },
    Status {
        query: Query,
        reply: oneshot::Sender<Option<GroupStatus>>,
    },
}

/// Multiplexes event subscriptions over one auto-reconnecting socket.
///
/// Subscriptions with the same event type and options share one query on
/// the node. Dropping the last handle shuts the manager down.
#[derive(Clone)]
pub struct SubscriptionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
    next_handle: Arc<AtomicU64>,
}

impl SubscriptionManager {
    /// Create a manager for `config.url`. No connection is made until
    /// [`open`](Self::open) or the first subscription.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: ManagerConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.url.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a manager that connects through `connector`.
    pub fn with_connector(config: ManagerConfig, connector: Arc<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let task = ManagerTask::new(config, connector, cmd_rx, open.clone());
        tokio::spawn(task.run());

        Self {
            cmd_tx,
            open,
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Open the socket. Fails with [`SubscriptionError::AlreadyOpen`] if a
    /// socket already exists.
    pub async fn open(&self) -> Result<(), SubscriptionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Open { reply })?;
        rx.await.map_err(|_| SubscriptionError::ManagerClosed)?
    }

    /// Drop every subscription and close the socket. A later `open()` or
    /// `subscribe` starts from scratch.
    pub async fn close(&self) -> Result<(), SubscriptionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close { reply })?;
        rx.await.map_err(|_| SubscriptionError::ManagerClosed)
    }

    /// `true` while the socket is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Register a listener for every data frame matching `event_type` and
    /// `options`.
    pub fn subscribe(
        &self,
        listener: EventListener,
        event_type: EventType,
        options: SubscriptionOptions,
    ) -> Result<(), SubscriptionError> {
        self.send(Command::Subscribe {
            query: Query::new(Some(&event_type), &options),
            callback: CallbackWrapper::Generic(listener),
        })
    }

    /// Remove `listener` from the group for `event_type`/`options`, or from
    /// every group when `event_type` is `None`.
    pub fn unsubscribe(
        &self,
        listener: &EventListener,
        event_type: Option<EventType>,
        options: SubscriptionOptions,
    ) -> Result<(), SubscriptionError> {
        self.send(Command::Unsubscribe {
            query: event_type.map(|e| Query::new(Some(&e), &options)),
            listener: ListenerRef::Generic(listener.clone()),
        })
    }

    /// Register a listener for the attribute map of each embedded event.
    /// When `options.message_action` is set only events whose `action`
    /// attribute equals it are delivered.
    pub fn subscribe_message(
        &self,
        listener: MessageListener,
        event_type: EventType,
        options: SubscriptionOptions,
    ) -> Result<(), SubscriptionError> {
        let action = options.message_action.clone().filter(|a| !a.is_empty());
        self.send(Command::Subscribe {
            query: Query::new(Some(&event_type), &options),
            callback: CallbackWrapper::Message { listener, action },
        })
    }

    /// Counterpart of [`subscribe_message`](Self::subscribe_message).
    pub fn unsubscribe_message(
        &self,
        listener: &MessageListener,
        event_type: Option<EventType>,
        options: SubscriptionOptions,
    ) -> Result<(), SubscriptionError> {
        self.send(Command::Unsubscribe {
            query: event_type.map(|e| Query::new(Some(&e), &options)),
            listener: ListenerRef::Message(listener.clone()),
        })
    }

    /// Like [`subscribe_message`](Self::subscribe_message), delivering into a
    /// channel. Pass the returned listener to `unsubscribe_message` to stop.
    pub fn subscribe_channel(
        &self,
        event_type: EventType,
        options: SubscriptionOptions,
    ) -> Result<(MessageListener, mpsc::UnboundedReceiver<Attributes>), SubscriptionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = MessageListener::new(move |attrs| {
            let _ = tx.send(attrs.clone());
        });
        self.subscribe_message(listener.clone(), event_type, options)?;
        Ok((listener, rx))
    }

    /// Remove every callback from every group.
    pub fn unsubscribe_all(&self) -> Result<(), SubscriptionError> {
        self.send(Command::UnsubscribeAll)
    }

    /// Register a connection lifecycle listener.
    pub fn add_listener(
        &self,
        kind: LifecycleKind,
        f: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Result<ListenerHandle, SubscriptionError> {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.send(Command::AddListener {
            handle,
            kind,
            callback: Arc::new(f),
        })?;
        Ok(handle)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> Result<(), SubscriptionError> {
        self.send(Command::RemoveListener { handle })
    }

    /// Current status of the group for `event_type`/`options`, if any.
    pub async fn status(
        &self,
        event_type: Option<EventType>,
        options: SubscriptionOptions,
    ) -> Result<Option<GroupStatus>, SubscriptionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status {
            query: Query::new(event_type.as_ref(), &options),
            reply,
        })?;
        rx.await.map_err(|_| SubscriptionError::ManagerClosed)
    }

    fn send(&self, cmd: Command) -> Result<(), SubscriptionError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| SubscriptionError::ManagerClosed)
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("open", &self.is_open())
            .finish()
    }
}

struct LifecycleEntry {
    handle: ListenerHandle,
    kind: LifecycleKind,
    callback: LifecycleCallback,
}

/// Background task that owns all manager state.
struct ManagerTask {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    registry: Registry,
    connection: Option<Connection>,
    generation: u64,
    backoff: Backoff,
    reconnect: TimerSlot,
    sweep: TimerSlot,
    listeners: Vec<LifecycleEntry>,
    open: Arc<AtomicBool>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    socket_tx: mpsc::UnboundedSender<TaggedEvent>,
    socket_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl ManagerTask {
    fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        open: Arc<AtomicBool>,
    ) -> Self {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let backoff = Backoff::new(config.backoff());
        Self {
            config,
            connector,
            registry: Registry::new(),
            connection: None,
            generation: 0,
            backoff,
            reconnect: TimerSlot::new(TimerKind::Reconnect),
            sweep: TimerSlot::new(TimerKind::Sweep),
            listeners: Vec::new(),
            open,
            cmd_rx,
            socket_tx,
            socket_rx,
            timer_tx,
            timer_rx,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some((generation, event)) = self.socket_rx.recv() => {
                    self.handle_socket_event(generation, event);
                }
                Some((kind, seq)) = self.timer_rx.recv() => self.handle_timer(kind, seq),
            }
        }
        self.shutdown();
        tracing::debug!("subscription manager stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open { reply } => {
                let _ = reply.send(self.open_socket());
            }
            Command::Close { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
            Command::Subscribe { query, callback } => self.subscribe(query, callback),
            Command::Unsubscribe { query, listener } => {
                let removed = self.registry.unsubscribe(query.as_ref(), &listener);
                tracing::debug!(query = ?query.as_ref().map(Query::as_str), removed, "unsubscribed");
                self.schedule_sweep();
            }
            Command::UnsubscribeAll => {
                self.registry.clear_callbacks();
                self.schedule_sweep();
            }
            Command::AddListener {
                handle,
                kind,
                callback,
            } => self.listeners.push(LifecycleEntry {
                handle,
                kind,
                callback,
            }),
            Command::RemoveListener { handle } => {
                self.listeners.retain(|l| l.handle != handle);
            }
            Command::Status { query, reply } => {
                let _ = reply.send(self.registry.status(&query));
            }
        }
    }

    fn subscribe(&mut self, query: Query, callback: CallbackWrapper) {
        let connected = self.is_connected();
        if let Some(req) = self.registry.subscribe(query, callback, connected) {
            self.send_request(&req);
        }
        // a pending reconnect counts as connecting
        if self.connection.is_none() && !self.reconnect.is_pending() {
            if let Err(e) = self.open_socket() {
                tracing::debug!(error = %e, "open on subscribe skipped");
            }
        }
        self.schedule_sweep();
    }

    fn open_socket(&mut self) -> Result<(), SubscriptionError> {
        if self.connection.is_some() {
            return Err(SubscriptionError::AlreadyOpen);
        }
        self.reconnect.cancel();
        self.generation += 1;
        self.connection = Some(Connection::spawn(
            self.generation,
            self.connector.clone(),
            self.socket_tx.clone(),
        ));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().map_or(false, Connection::is_open)
    }

    fn send_request(&self, req: &JsonRpcRequest) {
        let result = match &self.connection {
            Some(conn) => conn.send(req),
            None => Err(SubscriptionError::NotConnected),
        };
        if let Err(e) = result {
            tracing::warn!(id = req.id, method = %req.method, error = %e, "request not sent");
        }
    }

    /// Restart the debounce timer if any group is left without callbacks.
    fn schedule_sweep(&mut self) {
        self.sweep.cancel();
        if !self.is_connected() {
            self.registry.drop_empty_groups();
        } else if self.registry.has_empty_groups() {
            self.sweep.schedule(self.config.debounce(), &self.timer_tx);
        }
    }

    fn handle_timer(&mut self, kind: TimerKind, seq: u64) {
        match kind {
            TimerKind::Sweep => {
                if !self.sweep.fire(seq) {
                    return;
                }
                if !self.is_connected() {
                    self.registry.drop_empty_groups();
                    return;
                }
                for req in self.registry.sweep() {
                    self.send_request(&req);
                }
            }
            TimerKind::Reconnect => {
                if !self.reconnect.fire(seq) || self.connection.is_some() {
                    return;
                }
                tracing::info!("reconnecting");
                let _ = self.open_socket();
            }
        }
    }

    fn handle_socket_event(&mut self, generation: u64, event: SocketEvent) {
        let current = self.connection.as_ref().map(Connection::generation);
        if current != Some(generation) {
            tracing::debug!(generation, ?current, "ignoring event from superseded socket");
            return;
        }

        match event {
            SocketEvent::Opened => {
                if let Some(conn) = self.connection.as_mut() {
                    conn.mark_open();
                }
                self.open.store(true, Ordering::Relaxed);
                self.backoff.reset();
                tracing::info!(url = %self.connector.url(), groups = self.registry.len(), "WebSocket connected");

                for req in self.registry.reset_ids() {
                    self.send_request(&req);
                }
                self.notify(LifecycleEvent::Open);
            }
            SocketEvent::Frame(text) => {
                tracing::trace!(frame = %text, "received frame");
                match router::route(&mut self.registry, &text, self.config.attribute_encoding) {
                    Routed::Failed { failed, error } => {
                        if failed.subscribe {
                            tracing::info!(query = %failed.query, "subscription will be replayed on reconnect");
                        }
                        self.notify(LifecycleEvent::Error(TransportError::Rpc {
                            query: failed.query.to_string(),
                            error,
                        }));
                    }
                    Routed::Delivered { query, deliveries } => {
                        tracing::trace!(%query, deliveries, "frame delivered");
                    }
                    Routed::Acknowledged { query, status } => {
                        tracing::trace!(%query, %status, "group status updated");
                    }
                    Routed::UnsubscribedAll | Routed::Dropped => {}
                }
            }
            SocketEvent::Error(e) => {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "socket error");
                self.notify(LifecycleEvent::Error(e));
            }
            SocketEvent::Closed { clean } => {
                self.connection = None;
                self.open.store(false, Ordering::Relaxed);
                self.sweep.cancel();
                self.registry.mark_all_disconnected();

                if clean {
                    tracing::info!("WS closed");
                } else {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(url = %self.connector.url(), "WS disconnected, reconnecting in {delay:?}");
                    self.reconnect.schedule(delay, &self.timer_tx);
                }
                self.notify(LifecycleEvent::Close { clean });
            }
        }
    }

    /// Tear everything down: callbacks, timers, socket and ids.
    fn shutdown(&mut self) {
        self.registry.clear_callbacks();
        if self.is_connected() {
            self.send_request(&JsonRpcRequest::unsubscribe_all(UNSUBSCRIBE_ALL_ID));
        }
        self.sweep.cancel();
        self.reconnect.cancel();
        self.registry.clear();
        self.open.store(false, Ordering::Relaxed);

        if let Some(conn) = self.connection.take() {
            conn.close();
            self.notify(LifecycleEvent::Close { clean: true });
        }
    }

    fn notify(&self, event: LifecycleEvent) {
        let kind = event.kind();
        let callbacks: Vec<LifecycleCallback> = self
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.callback.clone())
            .collect();
        for callback in callbacks {
            invoke_isolated("lifecycle", || callback(&event));
        }
    }
}
