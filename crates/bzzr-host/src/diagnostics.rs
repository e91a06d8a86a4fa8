//! Read-only snapshot of the host state for display and periodic dumps.

use std::fmt;

use crate::color::Color;
use crate::store::EntityStore;

/// One participant line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantLine {
    /// Display name.
    pub name: String,
    /// Whether the device is online.
    pub connected: bool,
    /// Raw colour tag.
    pub color_tag: Option<String>,
    /// Resolved colour.
    pub color: Color,
}

/// One signal line.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalLine {
    /// Display name of the participant, or their id if they have since left.
    pub name: String,
    /// Server-measured reaction time in seconds.
    pub server_seconds: f64,
}

/// Immutable snapshot of session, participants and signals.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDiagnostics {
    /// Session join code, if a session exists.
    pub session_code: Option<String>,
    /// Whether buzzers are armed.
    pub armed: bool,
    /// Participants ordered by id.
    pub participants: Vec<ParticipantLine>,
    /// Signals in arrival order.
    pub signals: Vec<SignalLine>,
}

impl HostDiagnostics {
    /// Capture the current state of `store`.
    pub fn capture(store: &EntityStore, session_code: Option<String>, armed: bool) -> Self {
        let participants = store
            .participants()
            .into_iter()
            .map(|p| ParticipantLine {
                color: p.color(),
                color_tag: p.color_tag().map(str::to_string),
                connected: p.connected,
                name: p.display_name,
            })
            .collect();

        let signals = store
            .signals()
            .iter()
            .map(|s| SignalLine {
                name: store
                    .with_participant(s.participant(), |p| p.display_name.clone())
                    .unwrap_or_else(|| s.participant().to_string()),
                server_seconds: s.server_time().as_secs_f64(),
            })
            .collect();

        Self {
            session_code,
            armed,
            participants,
            signals,
        }
    }
}

impl fmt::Display for HostDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Room Info")?;
        writeln!(f, "  Room Code: {}", self.session_code.as_deref().unwrap_or(""))?;
        writeln!(f, "  Buzzers Armed: {}", if self.armed { "yes" } else { "no" })?;

        writeln!(f, "Players")?;
        if self.participants.is_empty() {
            writeln!(f, "  <No players>")?;
        }
        for p in &self.participants {
            let status = if p.connected { "" } else { " (Disconnected)" };
            writeln!(f, "  {}{status} [{}]", p.name, p.color)?;
        }

        writeln!(f, "Buzzes")?;
        if self.signals.is_empty() {
            write!(f, "  <No buzzes>")?;
        }
        for (i, s) in self.signals.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}: {:.4}s", s.name, s.server_seconds)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::Participant;
    use crate::payload::ParticipantRecord;
    use crate::signal::Signal;

    #[test]
    fn test_empty_placeholders() {
        let diag = HostDiagnostics::capture(&EntityStore::new(), None, false);
        let text = diag.to_string();
        assert!(text.contains("<No players>"));
        assert!(text.contains("<No buzzes>"));
        assert!(text.contains("Buzzers Armed: no"));
    }

    #[test]
    fn test_lines_rendered() {
        let store = EntityStore::new();
        store.insert_participant(Participant::from_record(&ParticipantRecord::new(
            "u1",
            "Ann",
            Some("red"),
            true,
        )));
        store.insert_participant(Participant::from_record(&ParticipantRecord::new(
            "u2", "Bob", None, false,
        )));
        store.push_signal(Signal::new("u1".into(), 250.0, 500.0));

        let diag = HostDiagnostics::capture(&store, Some("ABCD".into()), true);
        assert_eq!(diag.participants.len(), 2);
        assert_eq!(diag.signals[0].name, "Ann");

        let text = diag.to_string();
        assert!(text.contains("Room Code: ABCD"));
        assert!(text.contains("Ann [#ff0000]"));
        assert!(text.contains("Bob (Disconnected) [#ffffff]"));
        assert!(text.ends_with("Ann: 0.2500s"));
    }
}
