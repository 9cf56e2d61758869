use crate::connection::{PeerConnection, PeerId};
use crate::error::{Result, ServerError};
use crate::repository::{ConnectionRepository, SessionRepository};
use async_trait::async_trait;
use pitwall_core::domain::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, instrument};

/// In-memory connection and session-membership storage
pub struct MemoryStorage {
    connections: Arc<RwLock<HashMap<PeerId, PeerConnection>>>,
    sessions_to_peers: Arc<RwLock<HashMap<SessionId, Vec<PeerId>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            sessions_to_peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionRepository for MemoryStorage {
    #[instrument(skip(self, connection))]
    async fn add_connection(&self, connection: PeerConnection) -> Result<()> {
        debug!(peer_id = %connection.peer_id, session_id = %connection.session_id, "Adding connection");
        match self.connections.write() {
            Ok(mut connections) => {
                connections.insert(connection.peer_id, connection);
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to add connection");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn remove_connection(&self, peer_id: PeerId) -> Result<()> {
        debug!(%peer_id, "Removing connection");
        match self.connections.write() {
            Ok(mut connections) => {
                connections.remove(&peer_id);
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to remove connection");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_connection(&self, peer_id: PeerId) -> Result<Option<PeerConnection>> {
        match self.connections.read() {
            Ok(connections) => Ok(connections.get(&peer_id).cloned()),
            Err(e) => {
                error!(?e, "Failed to get connection");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_all_connections(&self) -> Result<Vec<PeerConnection>> {
        match self.connections.read() {
            Ok(connections) => Ok(connections.values().cloned().collect()),
            Err(e) => {
                error!(?e, "Failed to get all connections");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryStorage {
    #[instrument(skip(self))]
    async fn add_peer_to_session(&self, session_id: SessionId, peer_id: PeerId) -> Result<()> {
        debug!(%session_id, %peer_id, "Adding peer to session");
        match self.sessions_to_peers.write() {
            Ok(mut sessions) => {
                let peers = sessions.entry(session_id).or_default();
                if !peers.contains(&peer_id) {
                    peers.push(peer_id);
                }
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to add peer to session");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn remove_peer_from_session(
        &self,
        session_id: SessionId,
        peer_id: PeerId,
    ) -> Result<()> {
        debug!(%session_id, %peer_id, "Removing peer from session");
        match self.sessions_to_peers.write() {
            Ok(mut sessions) => {
                if let Some(peers) = sessions.get_mut(&session_id) {
                    peers.retain(|&id| id != peer_id);
                    if peers.is_empty() {
                        sessions.remove(&session_id);
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to remove peer from session");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn peers_in_session(&self, session_id: &SessionId) -> Result<Vec<PeerId>> {
        match self.sessions_to_peers.read() {
            Ok(sessions) => Ok(sessions.get(session_id).cloned().unwrap_or_default()),
            Err(e) => {
                error!(?e, "Failed to list session peers");
                Err(ServerError::Storage(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::protocol::TransportKind;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn connection(session: &str) -> PeerConnection {
        let (sender, _rx) = mpsc::unbounded_channel();
        PeerConnection::new(
            Uuid::new_v4(),
            SessionId::from(session),
            TransportKind::Framed,
            sender,
        )
    }

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let storage = MemoryStorage::new();
        let conn = connection("race-1");
        let peer_id = conn.peer_id;

        storage.add_connection(conn).await.unwrap();
        assert!(storage.get_connection(peer_id).await.unwrap().is_some());

        storage.remove_connection(peer_id).await.unwrap();
        assert!(storage.get_connection(peer_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_membership_is_deduplicated() {
        let storage = MemoryStorage::new();
        let session = SessionId::from("race-1");
        let peer = Uuid::new_v4();

        storage
            .add_peer_to_session(session.clone(), peer)
            .await
            .unwrap();
        storage
            .add_peer_to_session(session.clone(), peer)
            .await
            .unwrap();

        assert_eq!(storage.peers_in_session(&session).await.unwrap(), vec![peer]);
    }

    #[tokio::test]
    async fn test_empty_session_is_dropped() {
        let storage = MemoryStorage::new();
        let session = SessionId::from("race-1");
        let peer = Uuid::new_v4();

        storage
            .add_peer_to_session(session.clone(), peer)
            .await
            .unwrap();
        storage
            .remove_peer_from_session(session.clone(), peer)
            .await
            .unwrap();

        assert!(storage.peers_in_session(&session).await.unwrap().is_empty());
    }
}
