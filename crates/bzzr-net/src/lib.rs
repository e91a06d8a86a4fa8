//! Connection ownership: the named-event transport boundary, a framed TCP
//! event client, an in-process loopback connection, and reconnection backoff.

pub mod client;
pub mod connection;
pub mod envelope;
pub mod framing;
pub mod local;
pub mod reconnection;

pub use client::{EventClient, EventClientConfig};
pub use connection::{
    ConnectedHook, Connection, ConnectionState, ConnectionStateWatch, EventHandler,
    HandlerRegistry,
};
pub use envelope::{Envelope, EnvelopeError, decode_envelope, encode_envelope};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use local::{LocalConnection, SentRequest};
pub use reconnection::{Backoff, ReconnectConfig, ReconnectError, connect_with_backoff};
