use crate::connection::PeerId;
use crate::error::Result;
use crate::repository::{ConnectionRepository, SessionRepository};
use pitwall_core::domain::SessionId;
use pitwall_core::protocol::Frame;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Broadcasts frames to every peer of a session except the producer.
///
/// Each peer receives the frame encoded in its own wire dialect; a mixed
/// session of framed and event-bus peers sees the same logical traffic.
#[derive(Clone)]
pub struct SessionFanout {
    connections: Arc<dyn ConnectionRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl SessionFanout {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        SessionFanout {
            connections,
            sessions,
        }
    }

    #[instrument(skip(self, frame), fields(%session_id))]
    pub async fn broadcast(
        &self,
        session_id: &SessionId,
        frame: &Frame,
        exclude: Option<PeerId>,
    ) -> Result<usize> {
        let peers = self.sessions.peers_in_session(session_id).await?;
        let mut delivered = 0;

        for peer_id in peers {
            if Some(peer_id) == exclude {
                continue;
            }
            let Some(connection) = self.connections.get_connection(peer_id).await? else {
                continue;
            };

            let encoded = match frame.encode(connection.kind) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(%peer_id, error = %e, "failed to encode frame for peer");
                    continue;
                }
            };

            // A dead sender means the writer task is gone; the disconnect
            // path will clean the repository up
            if connection.sender.send(encoded).is_err() {
                debug!(%peer_id, "peer writer closed, skipping");
                continue;
            }
            delivered += 1;
        }

        debug!(delivered, "broadcast complete");
        Ok(delivered)
    }
}
