//! Named-event envelopes carried inside frames.
//!
//! Wire format of a frame payload: `[version: u8] [JSON envelope]` where the
//! envelope is `{"event": "<name>", "payload": <any JSON or null>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current envelope version. Prepended to every encoded envelope.
pub const ENVELOPE_VERSION: u8 = 1;

/// Keepalive event sent by the client heartbeat.
pub const PING_EVENT: &str = "ping";

/// Keepalive reply from the server. Never dispatched to handlers.
pub const PONG_EVENT: &str = "pong";

/// One named event or request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Event or request name, e.g. `players.update`.
    pub event: String,
    /// Event body. Absent and `null` are the same thing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Build an envelope for `event`.
    pub fn new(event: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Whether this is heartbeat traffic rather than an application event.
    pub fn is_keepalive(&self) -> bool {
        self.event == PING_EVENT || self.event == PONG_EVENT
    }
}

/// Errors that can occur while decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The payload was empty (no version byte).
    #[error("empty payload, missing version byte")]
    EmptyPayload,

    /// The version byte does not match [`ENVELOPE_VERSION`].
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// The body was not a valid JSON envelope.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize an [`Envelope`] into a versioned frame payload.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    let body = serde_json::to_vec(envelope)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned frame payload into an [`Envelope`].
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, EnvelopeError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(EnvelopeError::EmptyPayload);
    };
    if version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }

    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_players_update_roundtrip() {
        let envelope = Envelope::new(
            "players.update",
            Some(json!([{"userId": "u1", "name": "Ann", "connectionStatus": "connected"}])),
        );
        let bytes = encode_envelope(&envelope).unwrap();
        assert_eq!(bytes[0], ENVELOPE_VERSION);
        assert_eq!(decode_envelope(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_payloadless_request_omits_field() {
        let bytes = encode_envelope(&Envelope::new("buzzer.arm", None)).unwrap();
        assert_eq!(&bytes[1..], br#"{"event":"buzzer.arm"}"#);
    }

    #[test]
    fn test_null_payload_decodes_as_none() {
        let mut bytes = vec![ENVELOPE_VERSION];
        bytes.extend_from_slice(br#"{"event":"lobby.host.new","payload":null}"#);
        assert_eq!(decode_envelope(&bytes).unwrap().payload, None);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = encode_envelope(&Envelope::new(PING_EVENT, None)).unwrap();
        bytes[0] = 255;
        assert!(matches!(
            decode_envelope(&bytes),
            Err(EnvelopeError::UnsupportedVersion(255))
        ));
    }

    #[test]
    fn test_empty_and_corrupt_payloads_rejected() {
        assert!(matches!(decode_envelope(&[]), Err(EnvelopeError::EmptyPayload)));
        assert!(matches!(
            decode_envelope(&[ENVELOPE_VERSION, b'{', b'x']),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn test_keepalive_detection() {
        assert!(Envelope::new(PONG_EVENT, None).is_keepalive());
        assert!(!Envelope::new("pm", None).is_keepalive());
    }
}
