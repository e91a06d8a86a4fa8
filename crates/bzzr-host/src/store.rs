//! The Entity Store: the local mirror of participants and signals.
//!
//! Participants live in a concurrent map keyed by id. Signals live in an
//! ordered sequence behind a short-held lock; the head is the current
//! signal. The store never raises notifications, and only the reconciler
//! mutates it, so every mutator is crate-private.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::participant::{Participant, ParticipantId};
use crate::signal::Signal;

/// Thread-safe container for participants and the signal sequence.
#[derive(Default)]
pub struct EntityStore {
    participants: DashMap<ParticipantId, Participant>,
    signals: RwLock<Vec<Signal>>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -- participants -------------------------------------------------------

    /// Insert a participant. Returns `false` (and keeps the existing entry)
    /// if the id is already present.
    pub(crate) fn insert_participant(&self, participant: Participant) -> bool {
        match self.participants.entry(participant.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(participant);
                true
            }
        }
    }

    /// Mutate a participant in place.
    pub(crate) fn update_participant<R>(
        &self,
        id: &ParticipantId,
        f: impl FnOnce(&mut Participant) -> R,
    ) -> Option<R> {
        self.participants.get_mut(id).map(|mut entry| f(&mut entry))
    }

    /// Remove a participant, returning it.
    pub(crate) fn remove_participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.participants.remove(id).map(|(_, participant)| participant)
    }

    /// Whether `id` is present.
    pub fn contains_participant(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Snapshot copy of one participant.
    pub fn participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.participants.get(id).map(|entry| entry.clone())
    }

    /// Borrow one participant for the duration of `f`.
    pub fn with_participant<R>(
        &self,
        id: &ParticipantId,
        f: impl FnOnce(&Participant) -> R,
    ) -> Option<R> {
        self.participants.get(id).map(|entry| f(&entry))
    }

    /// Ids of every participant, ascending.
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.participants.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot copies of every participant, ordered by id.
    pub fn participants(&self) -> Vec<Participant> {
        let mut all: Vec<_> = self.participants.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// First participant (by id) whose display name equals `name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<Participant> {
        let wanted = name.to_lowercase();
        self.participants()
            .into_iter()
            .find(|p| p.display_name.to_lowercase() == wanted)
    }

    /// Number of participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    // -- signals ------------------------------------------------------------

    fn signals_read(&self) -> RwLockReadGuard<'_, Vec<Signal>> {
        self.signals.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn signals_write(&self) -> RwLockWriteGuard<'_, Vec<Signal>> {
        self.signals.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a signal to the end of the sequence.
    pub(crate) fn push_signal(&self, signal: Signal) {
        self.signals_write().push(signal);
    }

    /// Remove the first signal identical to `signal`. Returns whether one was found.
    pub(crate) fn remove_signal(&self, signal: &Signal) -> bool {
        let mut signals = self.signals_write();
        match signals.iter().position(|s| s.is_same_as(signal)) {
            Some(index) => {
                signals.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every signal raised by `id`, returning them in sequence order.
    pub(crate) fn remove_signals_for(&self, id: &ParticipantId) -> Vec<Signal> {
        let mut signals = self.signals_write();
        let (removed, kept): (Vec<_>, Vec<_>) =
            signals.drain(..).partition(|s| s.participant() == id);
        *signals = kept;
        removed
    }

    /// Snapshot copy of the signal sequence in arrival order.
    pub fn signals(&self) -> Vec<Signal> {
        self.signals_read().clone()
    }

    /// Borrow the signal sequence for the duration of `f`.
    ///
    /// `f` must not call back into the store's signal mutators.
    pub fn with_signals<R>(&self, f: impl FnOnce(&[Signal]) -> R) -> R {
        f(&self.signals_read())
    }

    /// The head of the sequence.
    pub fn current_signal(&self) -> Option<Signal> {
        self.signals_read().first().cloned()
    }

    /// Number of signals.
    pub fn signal_count(&self) -> usize {
        self.signals_read().len()
    }
}
