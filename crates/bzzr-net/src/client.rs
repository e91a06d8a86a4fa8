//! TCP client for the named-event server.
//!
//! Owns the full connection lifecycle: connecting with backoff, heartbeat
//! keepalive, dispatching inbound events, and clean disconnect. State changes
//! are broadcast through a [`ConnectionStateWatch`].
//!
//! Each successful connect starts three tasks on the supplied runtime: a
//! reader that decodes frames and invokes handlers inline (so one event name
//! is always handled in server order), a writer that drains the outbound
//! queue, and a heartbeat that pings and watches for silence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::connection::{
    ConnectedHook, Connection, ConnectionState, ConnectionStateWatch, EventHandler,
    HandlerRegistry,
};
use crate::envelope::{Envelope, PING_EVENT, decode_envelope, encode_envelope};
use crate::framing::{FrameConfig, read_frame, write_frame};
use crate::reconnection::{ReconnectConfig, connect_with_backoff};

/// Settings for an [`EventClient`].
#[derive(Debug, Clone)]
pub struct EventClientConfig {
    /// `host:port` of the event server.
    pub addr: String,
    /// Frame size limits.
    pub frame: FrameConfig,
    /// Interval between keepalive pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is declared lost.
    pub timeout: Duration,
    /// Backoff applied to connection attempts.
    pub reconnect: ReconnectConfig,
}

impl EventClientConfig {
    /// Config for `addr` with default timings.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            frame: FrameConfig::default(),
            heartbeat_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Live link to one connection attempt. Replaced on every `connect`.
struct Link {
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown_tx: watch::Sender<bool>,
}

/// State shared between the client handle and its background tasks.
struct Shared {
    config: EventClientConfig,
    registry: HandlerRegistry,
    state: ConnectionStateWatch,
    generation: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Only the newest link may publish state transitions.
    fn set_state_if_current(&self, generation: u64, state: ConnectionState) {
        if self.is_current(generation) {
            self.state.set(state);
        }
    }
}

/// Named-event client over framed TCP.
pub struct EventClient {
    runtime: Handle,
    shared: Arc<Shared>,
    link: Mutex<Option<Link>>,
}

impl EventClient {
    /// Create a disconnected client whose tasks will run on `runtime`.
    pub fn new(config: EventClientConfig, runtime: Handle) -> Self {
        Self {
            runtime,
            shared: Arc::new(Shared {
                config,
                registry: HandlerRegistry::new(),
                state: ConnectionStateWatch::new(),
                generation: AtomicU64::new(0),
            }),
            link: Mutex::new(None),
        }
    }

    /// The connection state watch.
    pub fn state_watch(&self) -> &ConnectionStateWatch {
        &self.shared.state
    }

    fn close_link(link: Link) {
        let _ = link.shutdown_tx.send(true);
    }

    async fn run_link(
        shared: Arc<Shared>,
        generation: u64,
        ping_tx: mpsc::UnboundedSender<Envelope>,
        outbound_rx: mpsc::UnboundedReceiver<Envelope>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let addr = shared.config.addr.clone();
        let stream = match connect_with_backoff(
            &addr,
            shared.config.reconnect.clone(),
            &mut shutdown_rx,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Could not connect to {addr}: {e}");
                shared.set_state_if_current(generation, ConnectionState::Disconnected);
                return;
            }
        };
        if !shared.is_current(generation) || *shutdown_rx.borrow() {
            tracing::debug!("Link to {addr} was superseded before it came up; closing it");
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("TCP_NODELAY not applied: {e}");
        }

        let (reader, writer) = stream.into_split();
        let last_inbound = Arc::new(AtomicU64::new(0));
        let started = Instant::now();

        shared.set_state_if_current(generation, ConnectionState::Connected);
        tracing::info!("Connected to {addr}");
        shared.registry.fire_connected();

        let writer_shared = Arc::clone(&shared);
        let writer_shutdown = shutdown_rx.clone();
        let writer_task = tokio::spawn(async move {
            Self::write_loop(writer, outbound_rx, &writer_shared, writer_shutdown).await;
        });

        let hb_shared = Arc::clone(&shared);
        let hb_inbound = Arc::clone(&last_inbound);
        let hb_shutdown = shutdown_rx.clone();
        let mut heartbeat_task = tokio::spawn(async move {
            Self::heartbeat_loop(&hb_shared, started, &hb_inbound, ping_tx, hb_shutdown).await;
        });

        let reader_shutdown = shutdown_rx.clone();
        tokio::select! {
            _ = Self::read_loop(reader, &shared, started, &last_inbound, reader_shutdown) => {}
            _ = &mut heartbeat_task => {}
        }
        heartbeat_task.abort();
        shared.set_state_if_current(generation, ConnectionState::Disconnected);

        // A requested shutdown flushes queued requests; a lost link drops them.
        if *shutdown_rx.borrow() {
            let _ = writer_task.await;
        } else {
            writer_task.abort();
        }
        tracing::info!("Connection to {addr} closed");
    }

    /// Decode frames and hand them to handlers until closed or shut down.
    async fn read_loop(
        mut reader: OwnedReadHalf,
        shared: &Shared,
        started: Instant,
        last_inbound: &AtomicU64,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let frame_config = shared.config.frame.clone();
        loop {
            tokio::select! {
                result = read_frame(&mut reader, &frame_config) => {
                    let bytes = match result {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::debug!("Read loop ending: {e}");
                            break;
                        }
                    };
                    last_inbound.store(started.elapsed().as_millis() as u64, Ordering::Release);
                    if bytes.is_empty() {
                        continue;
                    }

                    match decode_envelope(&bytes) {
                        Ok(envelope) if envelope.is_keepalive() => {}
                        Ok(envelope) => {
                            let payload = envelope.payload.unwrap_or(Value::Null);
                            shared.registry.dispatch(&envelope.event, payload);
                        }
                        Err(e) => tracing::warn!("Dropping undecodable frame: {e}"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Write queued requests. On shutdown, flush what was already queued.
    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
        shared: &Shared,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let frame_config = shared.config.frame.clone();
        loop {
            tokio::select! {
                next = outbound_rx.recv() => {
                    let Some(envelope) = next else { break };
                    if !Self::write_envelope(&mut writer, &envelope, &frame_config).await {
                        return;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        outbound_rx.close();
        while let Ok(envelope) = outbound_rx.try_recv() {
            if !Self::write_envelope(&mut writer, &envelope, &frame_config).await {
                return;
            }
        }
    }

    async fn write_envelope(
        writer: &mut OwnedWriteHalf,
        envelope: &Envelope,
        frame_config: &FrameConfig,
    ) -> bool {
        let bytes = match encode_envelope(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Dropping unencodable request {:?}: {e}", envelope.event);
                return true;
            }
        };
        match write_frame(writer, &bytes, frame_config).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Write failed for {:?}: {e}", envelope.event);
                false
            }
        }
    }

    /// Ping every interval. Returns once `timeout` passes without any inbound
    /// frame, which ends the link.
    async fn heartbeat_loop(
        shared: &Shared,
        started: Instant,
        last_inbound: &AtomicU64,
        ping_tx: mpsc::UnboundedSender<Envelope>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(shared.config.heartbeat_interval);
        let timeout_ms = shared.config.timeout.as_millis() as u64;
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = started.elapsed().as_millis() as u64;
                    let silent_for = now_ms.saturating_sub(last_inbound.load(Ordering::Acquire));
                    if silent_for > timeout_ms {
                        tracing::warn!("Heartbeat timeout: no frame in {silent_for} ms");
                        break;
                    }
                    if ping_tx.send(Envelope::new(PING_EVENT, None)).is_err() {
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

impl Connection for EventClient {
    fn on(&self, event: &str, handler: EventHandler) {
        self.shared.registry.register(event, handler);
    }

    fn on_connected(&self, hook: ConnectedHook) {
        self.shared.registry.register_connected(hook);
    }

    fn connect(&self) {
        let mut slot = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            Self::close_link(old);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *slot = Some(Link {
            outbound: outbound.clone(),
            shutdown_tx,
        });
        self.shared.state.set(ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(Self::run_link(
            shared,
            generation,
            outbound,
            outbound_rx,
            shutdown_rx,
        ));
    }

    fn disconnect(&self) {
        let mut slot = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            Self::close_link(old);
        }
        self.shared.state.set(ConnectionState::Disconnected);
    }

    fn emit(&self, event: &str, payload: Option<Value>) {
        if self.shared.state.current() != ConnectionState::Connected {
            tracing::debug!("Not connected; dropping request {event:?}");
            return;
        }
        let slot = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(link) if link.outbound.send(Envelope::new(event, payload)).is_ok() => {}
            _ => tracing::debug!("No live link; dropping request {event:?}"),
        }
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.current()
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
