//! Signals: a participant's "buzz-in" with its measured reaction times.

use std::time::Duration;

use crate::participant::ParticipantId;

/// One buzz-in.
///
/// The participant is referenced by id; the store owns the participant
/// itself. Identity is the pair (participant, server time), see
/// [`Signal::is_same_as`].
#[derive(Debug, Clone)]
pub struct Signal {
    participant: ParticipantId,
    server_ms: f64,
    server_time: Duration,
    local_time: Duration,
    average_time: Duration,
}

impl Signal {
    /// Build a signal from raw millisecond timings.
    ///
    /// Negative or non-finite inputs resolve to zero durations. Identity
    /// still uses the raw server value, so two distinct negative timings
    /// remain distinct signals.
    pub fn new(participant: ParticipantId, server_ms: f64, local_ms: f64) -> Self {
        let server_time = millis_to_duration(server_ms);
        let local_time = millis_to_duration(local_ms);
        Self {
            participant,
            server_ms,
            server_time,
            local_time,
            average_time: (server_time + local_time) / 2,
        }
    }

    /// Id of the participant who buzzed.
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Reaction time measured by the server.
    pub fn server_time(&self) -> Duration {
        self.server_time
    }

    /// Reaction time measured on the participant's device.
    pub fn local_time(&self) -> Duration {
        self.local_time
    }

    /// Midpoint of server and local time.
    pub fn average_time(&self) -> Duration {
        self.average_time
    }

    /// Same participant and exactly equal server time, compared on the raw
    /// milliseconds as received.
    ///
    /// Local and average time are ignored.
    pub fn is_same_as(&self, other: &Signal) -> bool {
        self.participant == other.participant
            && self.server_ms.total_cmp(&other.server_ms).is_eq()
    }
}

fn millis_to_duration(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    // Float-to-int casts saturate, so huge inputs clamp instead of wrapping.
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}
