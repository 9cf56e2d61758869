pub mod channel;
pub mod payload;
pub mod wire;

pub use channel::Channel;
pub use payload::{
    decode_payload, encode_payload, ChannelPayload, CompetitorEntry, MessagePriority,
    RequestValidation, SwitchDriver, TeamMessage, ValidationSummary,
};
pub use wire::{Frame, TransportKind};

/// Structural validation failures on the wire boundary.
///
/// A message failing validation is dropped and logged by the caller; it must
/// never reach a subscriber callback (in either direction).
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Malformed payload on channel {channel}: {source}")]
    MalformedPayload {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}
