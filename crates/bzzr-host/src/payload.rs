//! Wire event names and tolerant decoding of inbound payloads.
//!
//! Every decoder takes the raw JSON value delivered by the connection and
//! returns `None` only when the top-level shape is unusable; malformed
//! entries inside an otherwise valid payload are skipped or defaulted.

use serde_json::{Map, Value, json};

use crate::participant::ParticipantId;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Inbound: the server created a session for this host.
pub const SESSION_CREATED: &str = "lobby.join.success";
/// Inbound: full participant list.
pub const PARTICIPANTS_SNAPSHOT: &str = "players.update";
/// Inbound: whether buzzers are armed.
pub const SIGNALS_STATE: &str = "buzzer.status";
/// Inbound: full map of current buzzes.
pub const SIGNALS_SNAPSHOT: &str = "buzzer.buzzes";
/// Inbound: private message from a participant.
pub const DIRECT_MESSAGE: &str = "pm";

/// Outbound: ask for a new session.
pub const CREATE_SESSION: &str = "lobby.host.new";
/// Outbound: rename or recolour a participant.
pub const UPDATE_PARTICIPANT: &str = "player.update";
/// Outbound: arm all buzzers.
pub const ARM_SIGNALS: &str = "buzzer.arm";
/// Outbound: disarm all buzzers.
pub const DISARM_SIGNALS: &str = "buzzer.disarm";
/// Outbound: prevent one participant from buzzing.
pub const LOCK_PARTICIPANT: &str = "buzzer.player.lock";
/// Outbound: allow one participant to buzz again.
pub const UNLOCK_PARTICIPANT: &str = "buzzer.player.unlock";
/// Outbound: remove a participant from the session.
pub const REMOVE_PARTICIPANT: &str = "player.kick";

const ARMED: &str = "armed";
const CONNECTED: &str = "connected";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Session details sent once the server has created the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Short code participants type to join.
    pub code: String,
    /// Id the server assigned to this host.
    pub local_id: String,
}

/// One entry of a participants snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name, empty when absent.
    pub display_name: String,
    /// Colour tag, if any.
    pub color_tag: Option<String>,
    /// Raw connection status string.
    pub connection_status: Option<String>,
}

impl ParticipantRecord {
    /// Convenience constructor.
    pub fn new(id: &str, display_name: &str, color_tag: Option<&str>, connected: bool) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.to_string(),
            color_tag: color_tag.map(str::to_string),
            connection_status: Some(if connected { CONNECTED } else { "disconnected" }.to_string()),
        }
    }

    /// `true` iff the status is exactly `"connected"`.
    pub fn is_connected(&self) -> bool {
        self.connection_status.as_deref() == Some(CONNECTED)
    }
}

/// One entry of a signals snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    /// Participant who buzzed.
    pub participant: ParticipantId,
    /// Server-measured reaction time in milliseconds.
    pub server_ms: f64,
    /// Device-measured reaction time in milliseconds.
    pub local_ms: f64,
}

/// A private message from a participant.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectMessage {
    /// Sender id.
    pub participant: ParticipantId,
    /// Message text.
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode `{roomCode, userId}`.
pub fn parse_session(value: &Value) -> Option<SessionInfo> {
    let obj = value.as_object()?;
    Some(SessionInfo {
        code: str_field(obj, "roomCode")?.to_string(),
        local_id: str_field(obj, "userId").unwrap_or_default().to_string(),
    })
}

/// Decode `[{userId, name, color?, connectionStatus}]`.
///
/// Entries that are not objects or carry no string `userId` are skipped.
pub fn parse_participants(value: &Value) -> Option<Vec<ParticipantRecord>> {
    let entries = value.as_array()?;
    let records = entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let Some(id) = str_field(obj, "userId") else {
                tracing::warn!("Skipping participant entry without userId");
                return None;
            };
            Some(ParticipantRecord {
                id: ParticipantId::new(id),
                display_name: str_field(obj, "name").unwrap_or_default().to_string(),
                color_tag: str_field(obj, "color").map(str::to_string),
                connection_status: str_field(obj, "connectionStatus").map(str::to_string),
            })
        })
        .collect();
    Some(records)
}

/// Decode the armed state. Anything other than the string `"armed"` means disarmed.
pub fn parse_armed(value: &Value) -> bool {
    value.as_str() == Some(ARMED)
}

/// Decode `{<userId>: {serverSpeed, localSpeed}}` in payload order.
///
/// Entries without both numeric timings are skipped.
pub fn parse_signals(value: &Value) -> Option<Vec<SignalRecord>> {
    let obj = value.as_object()?;
    let records = obj
        .iter()
        .filter_map(|(id, timings)| {
            let server_ms = timings.get("serverSpeed").and_then(Value::as_f64);
            let local_ms = timings.get("localSpeed").and_then(Value::as_f64);
            let (Some(server_ms), Some(local_ms)) = (server_ms, local_ms) else {
                tracing::warn!("Skipping buzz for {id:?} without numeric timings");
                return None;
            };
            Some(SignalRecord {
                participant: ParticipantId::new(id.as_str()),
                server_ms,
                local_ms,
            })
        })
        .collect();
    Some(records)
}

/// Decode `{playerId, message}`.
pub fn parse_direct_message(value: &Value) -> Option<DirectMessage> {
    let obj = value.as_object()?;
    Some(DirectMessage {
        participant: ParticipantId::new(str_field(obj, "playerId")?),
        message: str_field(obj, "message").map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Build the `player.update` body. `color` is omitted when `None`.
pub fn participant_update(id: &ParticipantId, name: &str, color: Option<&str>) -> Value {
    let mut body = json!({
        "userId": id.as_str(),
        "name": name,
    });
    if let (Some(color), Some(obj)) = (color, body.as_object_mut()) {
        obj.insert("color".to_string(), Value::from(color));
    }
    body
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}
