//! The Reconciler: diffs full snapshots against the Entity Store.
//!
//! Each reconciliation mutates the store and enqueues exactly one
//! notification per semantic change. The participant and signal streams each
//! hold their own mutex across diff and enqueue, so notifications for one
//! stream always leave in the order the reconciliations finished.
//!
//! Once the action queue is closed, incoming snapshots are discarded whole:
//! the store is left exactly as the last accepted reconciliation wrote it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::action_queue::ActionSender;
use crate::event::{HostEvent, Listeners};
use crate::participant::{Participant, ParticipantId};
use crate::payload::{DirectMessage, ParticipantRecord, SignalRecord};
use crate::signal::Signal;
use crate::store::EntityStore;

/// The only writer of the [`EntityStore`].
pub struct Reconciler {
    store: Arc<EntityStore>,
    actions: ActionSender,
    listeners: Arc<Listeners>,
    participants_lock: Mutex<()>,
    signals_lock: Mutex<()>,
}

impl Reconciler {
    /// Build a reconciler writing into `store` and notifying `listeners`
    /// through `actions`.
    pub fn new(store: Arc<EntityStore>, actions: ActionSender, listeners: Arc<Listeners>) -> Self {
        Self {
            store,
            actions,
            listeners,
            participants_lock: Mutex::new(()),
            signals_lock: Mutex::new(()),
        }
    }

    /// Apply a full participant list.
    ///
    /// Returns the notifications raised, in the order they were enqueued.
    pub fn reconcile_participants(&self, records: &[ParticipantRecord]) -> Vec<HostEvent> {
        let _stream = lock(&self.participants_lock);
        if self.is_closed("participant list") {
            return Vec::new();
        }
        let mut candidates: BTreeSet<ParticipantId> =
            self.store.participant_ids().into_iter().collect();
        let mut events = Vec::new();

        for record in records {
            candidates.remove(&record.id);

            let updated = self.store.update_participant(&record.id, |p| {
                let was_connected = p.apply_record(record);
                (was_connected, p.clone())
            });

            match updated {
                Some((was_connected, snapshot)) => {
                    if snapshot.connected == was_connected {
                        continue;
                    }
                    let event = if snapshot.connected {
                        tracing::info!("Participant {} reconnected", snapshot.display_name);
                        HostEvent::ParticipantReconnected(snapshot)
                    } else {
                        tracing::info!("Participant {} disconnected", snapshot.display_name);
                        HostEvent::ParticipantDisconnected(snapshot)
                    };
                    self.notify(&mut events, event);
                }
                None => {
                    let participant = Participant::from_record(record);
                    self.store.insert_participant(participant.clone());
                    tracing::info!(
                        "Participant {} joined ({})",
                        participant.display_name,
                        participant.id()
                    );
                    self.notify(&mut events, HostEvent::ParticipantJoined(participant));
                }
            }
        }

        for id in candidates {
            let Some(participant) = self.store.remove_participant(&id) else {
                continue;
            };
            tracing::info!("Participant {} has been kicked", participant.display_name);
            self.notify(&mut events, HostEvent::ParticipantKicked(participant));

            let _signals = lock(&self.signals_lock);
            for signal in self.store.remove_signals_for(&id) {
                tracing::info!("Buzz from kicked participant {id} cleared");
                self.notify(&mut events, HostEvent::SignalCleared(signal));
            }
        }

        events
    }

    /// Apply a full map of current signals, given in payload order.
    ///
    /// Returns the notifications raised, in the order they were enqueued.
    pub fn reconcile_signals(&self, records: &[SignalRecord]) -> Vec<HostEvent> {
        let _stream = lock(&self.signals_lock);
        if self.is_closed("buzz list") {
            return Vec::new();
        }
        let mut candidates = self.store.signals();
        let mut events = Vec::new();

        for record in records {
            let Some(name) = self
                .store
                .with_participant(&record.participant, |p| p.display_name.clone())
            else {
                tracing::debug!("Ignoring buzz from unknown participant {}", record.participant);
                continue;
            };

            let signal = Signal::new(record.participant.clone(), record.server_ms, record.local_ms);
            match candidates.iter().position(|c| c.is_same_as(&signal)) {
                Some(index) => {
                    candidates.remove(index);
                    tracing::debug!("Buzz from {name} unchanged");
                }
                None => {
                    self.store.push_signal(signal.clone());
                    tracing::info!(
                        "{name} buzzed with {:.4}s",
                        signal.server_time().as_secs_f64()
                    );
                    self.notify(&mut events, HostEvent::SignalRaised(signal));
                }
            }
        }

        for stale in candidates {
            if self.store.remove_signal(&stale) {
                tracing::info!("Buzz from {} cleared", stale.participant());
                self.notify(&mut events, HostEvent::SignalCleared(stale));
            }
        }

        events
    }

    /// Record a direct message on its sender. Raises no notification.
    ///
    /// Returns `false` when the sender is unknown.
    pub fn apply_direct_message(&self, message: &DirectMessage) -> bool {
        let _stream = lock(&self.participants_lock);
        if self.is_closed("direct message") {
            return false;
        }
        let known = self
            .store
            .update_participant(&message.participant, |p| {
                p.last_message.clone_from(&message.message);
            })
            .is_some();
        if !known {
            tracing::debug!("Ignoring message from unknown participant {}", message.participant);
        }
        known
    }

    /// Close the action queue once no reconciliation is in flight.
    ///
    /// Holds both stream locks while `close` runs, so every reconciliation
    /// either finished before it, with its notifications queued, or starts
    /// after it and is discarded.
    pub fn close_with(&self, close: impl FnOnce()) {
        let _participants = lock(&self.participants_lock);
        let _signals = lock(&self.signals_lock);
        close();
    }

    fn is_closed(&self, what: &str) -> bool {
        let closed = self.actions.is_closed();
        if closed {
            tracing::debug!("Host shut down; discarding {what}");
        }
        closed
    }

    fn notify(&self, events: &mut Vec<HostEvent>, event: HostEvent) {
        let listeners = Arc::clone(&self.listeners);
        let delivered = event.clone();
        self.actions.enqueue(move || listeners.dispatch(&delivered));
        events.push(event);
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
