//! Participants: the players connected to a room.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::payload::ParticipantRecord;

/// Server-assigned participant identifier. Stable for the participant's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Wrap a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A participant as mirrored from the server.
///
/// Two participants are the same entity iff their ids match; the mutable
/// fields never take part in identity.
#[derive(Debug, Clone)]
pub struct Participant {
    id: ParticipantId,
    /// Display name as last reported.
    pub display_name: String,
    color_tag: Option<String>,
    color: Color,
    /// Whether the participant's device is currently connected.
    pub connected: bool,
    /// Last direct message received from this participant.
    pub last_message: Option<String>,
}

impl Participant {
    /// Build a participant from its first appearance in a snapshot.
    pub fn from_record(record: &ParticipantRecord) -> Self {
        let mut participant = Self {
            id: record.id.clone(),
            display_name: String::new(),
            color_tag: None,
            color: Color::WHITE,
            connected: false,
            last_message: None,
        };
        participant.apply_record(record);
        participant
    }

    /// Overwrite the mutable fields from a snapshot record.
    ///
    /// Returns the previous `connected` value.
    pub fn apply_record(&mut self, record: &ParticipantRecord) -> bool {
        let was_connected = self.connected;
        self.display_name.clone_from(&record.display_name);
        self.set_color_tag(record.color_tag.clone());
        self.connected = record.is_connected();
        was_connected
    }

    /// The participant's id.
    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Raw colour tag, if the server sent one.
    pub fn color_tag(&self) -> Option<&str> {
        self.color_tag.as_deref()
    }

    /// Display colour resolved from the tag.
    pub fn color(&self) -> Color {
        self.color
    }

    /// Replace the colour tag and re-resolve the display colour.
    pub fn set_color_tag(&mut self, tag: Option<String>) {
        self.color = Color::from_tag(tag.as_deref());
        self.color_tag = tag;
    }

    /// Identity comparison: same id.
    pub fn is_same_as(&self, other: &Participant) -> bool {
        self.id == other.id
    }
}
