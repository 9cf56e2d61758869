use pitwall_core::domain::SessionId;
use pitwall_core::protocol::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Connection has not joined a session")]
    NotJoined,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Send failed: {0}")]
    Send(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
