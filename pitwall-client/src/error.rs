use pitwall_core::domain::{ComparisonError, HandoffError, ParticipantError};
use pitwall_core::protocol::ValidationError;

/// Client-side distribution layer errors.
///
/// Taxonomy: validation failures are recovered locally (dropped + logged),
/// transport failures while disconnected surface as a boolean send result,
/// coordination-input failures surface synchronously to the caller so the
/// initiating UI can react immediately.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Handoff rejected: {0}")]
    Handoff(#[from] HandoffError),

    #[error("Comparison rejected: {0}")]
    Comparison(#[from] ComparisonError),

    #[error("Participant error: {0}")]
    Participant(#[from] ParticipantError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
