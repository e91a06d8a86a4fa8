//! The host façade: wires a [`Connection`] to the reconciler and exposes the
//! mirrored state and outbound requests to the owner thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bzzr_net::{Connection, ConnectionState};
use serde_json::Value;

use crate::action_queue::{ActionQueue, ActionSender};
use crate::diagnostics::HostDiagnostics;
use crate::event::{HostEvent, ListenerId, Listeners};
use crate::participant::{Participant, ParticipantId};
use crate::payload;
use crate::reconcile::Reconciler;
use crate::signal::Signal;
use crate::store::EntityStore;

/// Session fields written only by drained actions.
#[derive(Debug, Default)]
struct SessionState {
    code: Option<String>,
    local_id: Option<String>,
    armed: bool,
}

type SharedSession = Arc<Mutex<SessionState>>;

fn lock_session(session: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A host client for one room.
///
/// Inbound events are reconciled on the connection's threads; everything the
/// consumer can observe changes only inside [`tick`](Self::tick), which must
/// be called from the owner thread.
pub struct BzzrHost<C: Connection> {
    connection: Arc<C>,
    store: Arc<EntityStore>,
    queue: ActionQueue,
    listeners: Arc<Listeners>,
    reconciler: Arc<Reconciler>,
    session: SharedSession,
}

impl<C: Connection> BzzrHost<C> {
    /// Register all event handlers on `connection`. Does not connect.
    pub fn new(connection: Arc<C>) -> Self {
        let store = Arc::new(EntityStore::new());
        let queue = ActionQueue::new();
        let listeners = Arc::new(Listeners::new());
        let session: SharedSession = Arc::default();
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            queue.sender(),
            Arc::clone(&listeners),
        ));

        register_handlers(
            connection.as_ref(),
            &reconciler,
            &queue.sender(),
            &listeners,
            &session,
        );

        let weak: Weak<C> = Arc::downgrade(&connection);
        connection.on_connected(Arc::new(move || {
            if let Some(connection) = weak.upgrade() {
                tracing::info!("Connected; requesting a new session");
                connection.emit(payload::CREATE_SESSION, None);
            }
        }));

        Self {
            connection,
            store,
            queue,
            listeners,
            reconciler,
            session,
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// (Re)connect and ask the server for a fresh session.
    pub fn create_session(&self) {
        if self.connection.state() != ConnectionState::Disconnected {
            tracing::info!("Restarting connection for a new session");
            self.connection.disconnect();
        }
        tracing::info!("Connecting to session server");
        self.connection.connect();
    }

    /// Close the connection. The host stays usable and can create a new session.
    pub fn close_session(&self) {
        tracing::info!("Closing session connection");
        self.connection.disconnect();
    }

    /// Run every pending action on the calling (owner) thread.
    ///
    /// Returns the number of actions run.
    pub fn tick(&self) -> usize {
        self.queue.drain_all()
    }

    /// Tear down: stop accepting actions, run what was accepted, disconnect.
    pub fn shutdown(&self) {
        if self.queue.is_closed() {
            return;
        }
        self.reconciler.close_with(|| self.queue.close());
        let ran = self.queue.drain_all();
        tracing::debug!("Final drain ran {ran} actions");
        self.connection.disconnect();
    }

    /// Add a listener called on the owner thread for every [`HostEvent`].
    pub fn subscribe(&self, listener: impl Fn(&HostEvent) + Send + Sync + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// An enqueue handle onto the owner-thread queue.
    pub fn action_sender(&self) -> ActionSender {
        self.queue.sender()
    }

    // -- state --------------------------------------------------------------

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The mirrored entities.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Join code of the current session, once created.
    pub fn session_code(&self) -> Option<String> {
        lock_session(&self.session).code.clone()
    }

    /// Id the server assigned to this host, once created.
    pub fn local_id(&self) -> Option<String> {
        lock_session(&self.session).local_id.clone()
    }

    /// Whether buzzers are armed.
    pub fn signals_armed(&self) -> bool {
        lock_session(&self.session).armed
    }

    /// Every participant, ordered by id.
    pub fn participants(&self) -> Vec<Participant> {
        self.store.participants()
    }

    /// One participant by id.
    pub fn participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.store.participant(id)
    }

    /// One participant by display name, ignoring case.
    pub fn find_participant(&self, name: &str) -> Option<Participant> {
        self.store.find_by_name(name)
    }

    /// Whether anyone is in the room.
    pub fn has_participants(&self) -> bool {
        self.store.participant_count() > 0
    }

    /// Every signal in arrival order.
    pub fn signals(&self) -> Vec<Signal> {
        self.store.signals()
    }

    /// The earliest-arrived signal still active.
    pub fn current_signal(&self) -> Option<Signal> {
        self.store.current_signal()
    }

    /// Whether any signal is active.
    pub fn has_signals(&self) -> bool {
        self.store.signal_count() > 0
    }

    /// Read-only snapshot for display.
    pub fn diagnostics(&self) -> HostDiagnostics {
        HostDiagnostics::capture(&self.store, self.session_code(), self.signals_armed())
    }

    // -- outbound requests --------------------------------------------------

    /// Rename and/or recolour a participant. Unspecified fields keep the
    /// participant's current values.
    pub fn update_participant(
        &self,
        participant: &Participant,
        name: Option<&str>,
        color: Option<&str>,
    ) {
        let name = name.unwrap_or(&participant.display_name);
        let color = color.or(participant.color_tag());
        self.connection.emit(
            payload::UPDATE_PARTICIPANT,
            Some(payload::participant_update(participant.id(), name, color)),
        );
    }

    /// Arm every buzzer.
    pub fn arm_signals(&self) {
        self.connection.emit(payload::ARM_SIGNALS, None);
    }

    /// Disarm every buzzer.
    pub fn disarm_signals(&self) {
        self.connection.emit(payload::DISARM_SIGNALS, None);
    }

    /// Stop one participant from buzzing.
    pub fn lock_participant(&self, id: &ParticipantId) {
        self.emit_for(payload::LOCK_PARTICIPANT, id);
    }

    /// Let one participant buzz again.
    pub fn unlock_participant(&self, id: &ParticipantId) {
        self.emit_for(payload::UNLOCK_PARTICIPANT, id);
    }

    /// Ask the server to remove a participant.
    pub fn remove_participant(&self, id: &ParticipantId) {
        self.emit_for(payload::REMOVE_PARTICIPANT, id);
    }

    fn emit_for(&self, event: &str, id: &ParticipantId) {
        self.connection.emit(event, Some(Value::from(id.as_str())));
    }
}

impl<C: Connection> Drop for BzzrHost<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn register_handlers<C: Connection>(
    connection: &C,
    reconciler: &Arc<Reconciler>,
    actions: &ActionSender,
    listeners: &Arc<Listeners>,
    session: &SharedSession,
) {
    {
        let actions = actions.clone();
        let listeners = Arc::clone(listeners);
        let session = Arc::clone(session);
        connection.on(
            payload::SESSION_CREATED,
            Arc::new(move |value: Value| {
                let Some(info) = payload::parse_session(&value) else {
                    tracing::warn!("Ignoring malformed {} payload", payload::SESSION_CREATED);
                    return;
                };
                tracing::info!("Session created with code {}", info.code);
                let listeners = Arc::clone(&listeners);
                let session = Arc::clone(&session);
                actions.enqueue(move || {
                    {
                        let mut state = lock_session(&session);
                        state.code = Some(info.code.clone());
                        state.local_id = Some(info.local_id);
                    }
                    listeners.dispatch(&HostEvent::SessionCreated { code: info.code });
                });
            }),
        );
    }

    {
        let reconciler = Arc::clone(reconciler);
        connection.on(
            payload::PARTICIPANTS_SNAPSHOT,
            Arc::new(move |value: Value| match payload::parse_participants(&value) {
                Some(records) => {
                    reconciler.reconcile_participants(&records);
                }
                None => {
                    tracing::warn!("Ignoring malformed {} payload", payload::PARTICIPANTS_SNAPSHOT)
                }
            }),
        );
    }

    {
        let actions = actions.clone();
        let session = Arc::clone(session);
        connection.on(
            payload::SIGNALS_STATE,
            Arc::new(move |value: Value| {
                let armed = payload::parse_armed(&value);
                tracing::debug!("Buzzers armed: {armed}");
                let session = Arc::clone(&session);
                actions.enqueue(move || lock_session(&session).armed = armed);
            }),
        );
    }

    {
        let reconciler = Arc::clone(reconciler);
        connection.on(
            payload::SIGNALS_SNAPSHOT,
            Arc::new(move |value: Value| match payload::parse_signals(&value) {
                Some(records) => {
                    reconciler.reconcile_signals(&records);
                }
                None => tracing::warn!("Ignoring malformed {} payload", payload::SIGNALS_SNAPSHOT),
            }),
        );
    }

    {
        let reconciler = Arc::clone(reconciler);
        connection.on(
            payload::DIRECT_MESSAGE,
            Arc::new(move |value: Value| match payload::parse_direct_message(&value) {
                Some(message) => {
                    reconciler.apply_direct_message(&message);
                }
                None => tracing::warn!("Ignoring malformed {} payload", payload::DIRECT_MESSAGE),
            }),
        );
    }
}
