//! Host-side state mirror for a live buzzer room.
//!
//! Named push events arrive from a [`bzzr_net::Connection`] on background
//! threads. The [`Reconciler`] diffs each full snapshot against the
//! [`EntityStore`] and enqueues one [`HostEvent`] per semantic change on the
//! [`ActionQueue`], which the owner thread drains through [`BzzrHost::tick`].

pub mod action_queue;
pub mod color;
pub mod diagnostics;
pub mod event;
pub mod host;
pub mod participant;
pub mod payload;
pub mod reconcile;
pub mod signal;
pub mod store;

#[cfg(test)]
mod tests;

pub use action_queue::{Action, ActionQueue, ActionSender};
pub use color::{Color, color_names};
pub use diagnostics::{HostDiagnostics, ParticipantLine, SignalLine};
pub use event::{HostEvent, Listener, ListenerId, Listeners};
pub use host::BzzrHost;
pub use participant::{Participant, ParticipantId};
pub use payload::{DirectMessage, ParticipantRecord, SessionInfo, SignalRecord};
pub use reconcile::Reconciler;
pub use signal::Signal;
pub use store::EntityStore;
