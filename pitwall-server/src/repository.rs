use crate::connection::{PeerConnection, PeerId};
use crate::error::Result;
use async_trait::async_trait;
use pitwall_core::domain::SessionId;

/// Storage for live peer connections
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn add_connection(&self, connection: PeerConnection) -> Result<()>;
    async fn remove_connection(&self, peer_id: PeerId) -> Result<()>;
    async fn get_connection(&self, peer_id: PeerId) -> Result<Option<PeerConnection>>;
    async fn get_all_connections(&self) -> Result<Vec<PeerConnection>>;
}

/// Storage for session broadcast-group membership
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn add_peer_to_session(&self, session_id: SessionId, peer_id: PeerId) -> Result<()>;
    async fn remove_peer_from_session(&self, session_id: SessionId, peer_id: PeerId)
        -> Result<()>;
    async fn peers_in_session(&self, session_id: &SessionId) -> Result<Vec<PeerId>>;
}
