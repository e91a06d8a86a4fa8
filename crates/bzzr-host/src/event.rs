//! Host notifications and the listeners that receive them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::participant::Participant;
use crate::signal::Signal;

/// One semantic change to the mirrored state.
///
/// Participant and signal payloads are copies taken when the change was
/// reconciled.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// The server created a session with this join code.
    SessionCreated {
        /// Code participants use to join.
        code: String,
    },
    /// A participant appeared for the first time.
    ParticipantJoined(Participant),
    /// A participant vanished from the participant list.
    ParticipantKicked(Participant),
    /// A participant's device went offline.
    ParticipantDisconnected(Participant),
    /// A participant's device came back online.
    ParticipantReconnected(Participant),
    /// A new buzz was recorded.
    SignalRaised(Signal),
    /// A buzz was cleared by the server.
    SignalCleared(Signal),
}

impl HostEvent {
    /// Short kebab-case name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session-created",
            Self::ParticipantJoined(_) => "participant-joined",
            Self::ParticipantKicked(_) => "participant-kicked",
            Self::ParticipantDisconnected(_) => "participant-disconnected",
            Self::ParticipantReconnected(_) => "participant-reconnected",
            Self::SignalRaised(_) => "signal-raised",
            Self::SignalCleared(_) => "signal-cleared",
        }
    }

    /// The participant carried by this event, if any.
    pub fn participant(&self) -> Option<&Participant> {
        match self {
            Self::ParticipantJoined(p)
            | Self::ParticipantKicked(p)
            | Self::ParticipantDisconnected(p)
            | Self::ParticipantReconnected(p) => Some(p),
            _ => None,
        }
    }

    /// The signal carried by this event, if any.
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Self::SignalRaised(s) | Self::SignalCleared(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionCreated { code } => write!(f, "{} {code}", self.name()),
            Self::SignalRaised(s) | Self::SignalCleared(s) => write!(
                f,
                "{} {} {:.4}s",
                self.name(),
                s.participant(),
                s.server_time().as_secs_f64()
            ),
            other => match other.participant() {
                Some(p) => write!(f, "{} {} ({})", other.name(), p.display_name, p.id()),
                None => f.write_str(other.name()),
            },
        }
    }
}

/// Callback invoked on the owner thread for every [`HostEvent`].
pub type Listener = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered consumer callbacks.
///
/// Dispatch copies the list before calling out, so a listener may subscribe
/// or unsubscribe from inside its callback.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn subscribe(&self, listener: impl Fn(&HostEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Deliver `event` to every listener in subscription order.
    pub fn dispatch(&self, event: &HostEvent) {
        let snapshot: Vec<Listener> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ParticipantId;
    use crate::payload::ParticipantRecord;

    #[test]
    fn test_dispatch_reaches_all_in_order() {
        let listeners = Listeners::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            listeners.subscribe(move |e| log.lock().unwrap().push(format!("{tag}:{}", e.name())));
        }

        listeners.dispatch(&HostEvent::SessionCreated { code: "ABCD".into() });
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:session-created", "second:session-created"]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let listeners = Listeners::new();
        let id = listeners.subscribe(|_| panic!("unsubscribed listener called"));
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        assert!(listeners.is_empty());
        listeners.dispatch(&HostEvent::SessionCreated { code: "X".into() });
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let listeners = Arc::new(Listeners::new());
        let inner = Arc::clone(&listeners);
        listeners.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        listeners.dispatch(&HostEvent::SessionCreated { code: "X".into() });
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_display_and_accessors() {
        let p = Participant::from_record(&ParticipantRecord::new("u1", "Ann", None, true));
        let joined = HostEvent::ParticipantJoined(p);
        assert_eq!(joined.to_string(), "participant-joined Ann (u1)");
        assert!(joined.signal().is_none());

        let raised = HostEvent::SignalRaised(Signal::new(ParticipantId::new("u1"), 250.0, 500.0));
        assert_eq!(raised.to_string(), "signal-raised u1 0.2500s");
        assert!(raised.participant().is_none());
    }
}
