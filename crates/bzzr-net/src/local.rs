//! In-process loopback [`Connection`].
//!
//! Nothing goes over a socket: the test (or demo) plays the server by calling
//! [`LocalConnection::deliver`] from whatever thread it likes, and inspects
//! the requests the client emitted with [`LocalConnection::sent`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::connection::{
    ConnectedHook, Connection, ConnectionState, ConnectionStateWatch, EventHandler,
    HandlerRegistry,
};

/// An outbound request captured by a [`LocalConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    /// Request name.
    pub event: String,
    /// Request body, if any.
    pub payload: Option<Value>,
}

/// Loopback connection that records requests and delivers events on demand.
#[derive(Default)]
pub struct LocalConnection {
    registry: HandlerRegistry,
    state: ConnectionStateWatch,
    sent: Mutex<Vec<SentRequest>>,
    connects: AtomicUsize,
}

impl LocalConnection {
    /// Create a disconnected loopback connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to its handlers on the calling thread.
    ///
    /// Returns `false` when no handler is registered for the name.
    pub fn deliver(&self, event: &str, payload: Value) -> bool {
        self.registry.dispatch(event, payload)
    }

    /// Requests emitted so far, oldest first.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the requests emitted so far.
    pub fn sent_events(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.event).collect()
    }

    /// Number of times `connect` succeeded.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    /// Simulate the server dropping the link.
    pub fn drop_link(&self) {
        self.state.set(ConnectionState::Disconnected);
    }
}

impl Connection for LocalConnection {
    fn on(&self, event: &str, handler: EventHandler) {
        self.registry.register(event, handler);
    }

    fn on_connected(&self, hook: ConnectedHook) {
        self.registry.register_connected(hook);
    }

    fn connect(&self) {
        self.state.set(ConnectionState::Connected);
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.registry.fire_connected();
    }

    fn disconnect(&self) {
        self.state.set(ConnectionState::Disconnected);
    }

    fn emit(&self, event: &str, payload: Option<Value>) {
        if self.state.current() != ConnectionState::Connected {
            tracing::debug!("Loopback not connected; dropping request {event:?}");
            return;
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentRequest {
                event: event.to_string(),
                payload,
            });
    }

    fn state(&self) -> ConnectionState {
        self.state.current()
    }
}
