//! The named-event connection boundary.
//!
//! A [`Connection`] delivers named push events to registered handlers on
//! whatever thread the transport runs on, accepts fire-and-forget outbound
//! requests, and reports its lifecycle through a [`ConnectionStateWatch`].

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;

/// Handler for one named event. Invoked on a transport thread.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Hook run every time a connection attempt succeeds.
pub type ConnectedHook = Arc<dyn Fn() + Send + Sync>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish the connection.
    Connecting,
    /// Connected and ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// A persistent bidirectional named-event connection.
///
/// Events for one name are delivered in the order the server sent them.
/// Nothing is promised across names. Outbound requests are best effort: when
/// the connection is unavailable they are dropped.
pub trait Connection: Send + Sync + 'static {
    /// Register a handler for `event`. Handlers survive reconnects.
    fn on(&self, event: &str, handler: EventHandler);

    /// Register a hook that runs after every successful connect.
    fn on_connected(&self, hook: ConnectedHook);

    /// Start connecting. Returns immediately.
    fn connect(&self);

    /// Close the connection. Requests already accepted are still flushed.
    fn disconnect(&self);

    /// Send a named request without waiting for any acknowledgement.
    fn emit(&self, event: &str, payload: Option<Value>);

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Thread-safe table of named-event handlers and connect hooks.
///
/// Dispatch copies the handler list out of the map before invoking it, so a
/// handler may register further handlers without deadlocking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Vec<EventHandler>>,
    connected_hooks: Mutex<Vec<ConnectedHook>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `event`.
    pub fn register(&self, event: &str, handler: EventHandler) {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Add a connect hook.
    pub fn register_connected(&self, hook: ConnectedHook) {
        self.connected_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Invoke every handler registered for `event`. Returns `false` if none.
    pub fn dispatch(&self, event: &str, payload: Value) -> bool {
        let handlers = match self.handlers.get(event) {
            Some(list) => list.clone(),
            None => {
                tracing::trace!("No handler for event {event:?}");
                return false;
            }
        };

        for handler in &handlers {
            handler(payload.clone());
        }
        true
    }

    /// Run every connect hook in registration order.
    pub fn fire_connected(&self) {
        let hooks = self
            .connected_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for hook in hooks {
            hook();
        }
    }
}
