use pitwall_core::domain::SessionId;
use pitwall_core::protocol::TransportKind;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub type PeerId = Uuid;

/// One connected peer: its session membership, the wire dialect it speaks,
/// and the channel feeding its socket writer task
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub session_id: SessionId,
    /// Learned from the first frame the peer sent; replies and broadcasts
    /// to this peer are encoded in the same dialect
    pub kind: TransportKind,
    pub sender: UnboundedSender<String>,
}

impl PeerConnection {
    pub fn new(
        peer_id: PeerId,
        session_id: SessionId,
        kind: TransportKind,
        sender: UnboundedSender<String>,
    ) -> Self {
        PeerConnection {
            peer_id,
            session_id,
            kind,
            sender,
        }
    }
}
