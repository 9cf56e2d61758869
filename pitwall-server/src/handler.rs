use crate::connection::{PeerConnection, PeerId};
use crate::error::{Result, ServerError};
use crate::fanout::SessionFanout;
use crate::repository::{ConnectionRepository, SessionRepository};
use crate::store::TelemetryStore;
use pitwall_core::domain::{SessionId, TelemetrySample};
use pitwall_core::protocol::{decode_payload, Channel, Frame, TransportKind};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Per-connection protocol handler: session membership, server-side
/// re-validation, telemetry persistence, and fan-out to session peers.
///
/// Cloneable; `new_from` produces a fresh handler (new peer identity,
/// shared storage) for each accepted socket.
#[derive(Clone)]
pub struct ConnectionHandler {
    peer_id: PeerId,
    session: Arc<RwLock<Option<SessionId>>>,
    kind: Arc<RwLock<TransportKind>>,
    connections: Arc<dyn ConnectionRepository>,
    sessions: Arc<dyn SessionRepository>,
    telemetry: Arc<dyn TelemetryStore>,
    fanout: SessionFanout,
    sender: Option<UnboundedSender<String>>,
}

impl ConnectionHandler {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        sessions: Arc<dyn SessionRepository>,
        telemetry: Arc<dyn TelemetryStore>,
    ) -> Self {
        let fanout = SessionFanout::new(connections.clone(), sessions.clone());
        ConnectionHandler {
            peer_id: Uuid::new_v4(),
            session: Arc::new(RwLock::new(None)),
            kind: Arc::new(RwLock::new(TransportKind::Framed)),
            connections,
            sessions,
            telemetry,
            fanout,
            sender: None,
        }
    }

    /// Fresh handler for a newly accepted socket, sharing storage
    pub fn new_from(other: &Self) -> Self {
        ConnectionHandler {
            peer_id: Uuid::new_v4(),
            session: Arc::new(RwLock::new(None)),
            kind: Arc::new(RwLock::new(TransportKind::Framed)),
            connections: other.connections.clone(),
            sessions: other.sessions.clone(),
            telemetry: other.telemetry.clone(),
            fanout: other.fanout.clone(),
            sender: None,
        }
    }

    pub fn with_sender(&self, sender: UnboundedSender<String>) -> Self {
        let mut handler = Self::new_from(self);
        handler.sender = Some(sender);
        handler
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn kind(&self) -> TransportKind {
        *self.kind.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle one inbound text frame
    #[instrument(skip(self, raw), fields(peer_id = %self.peer_id))]
    pub async fn handle_text(&self, raw: &str) -> Result<()> {
        let (frame, kind) = Frame::decode_any(raw)?;
        // The dialect of the latest inbound frame is the one replies and
        // broadcasts to this peer use
        *self.kind.write().unwrap_or_else(|e| e.into_inner()) = kind;

        match frame {
            Frame::JoinSession { session_id } => self.join(session_id).await,
            Frame::LeaveSession { session_id } => self.leave(session_id).await,
            Frame::Publish { channel, data } => self.publish(channel, data).await,
        }
    }

    #[instrument(skip(self), fields(peer_id = %self.peer_id))]
    async fn join(&self, session_id: SessionId) -> Result<()> {
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| ServerError::Send("connection has no writer".into()))?;

        // A peer can be in at most one session; joining another leaves the
        // first implicitly
        if let Some(current) = self.session() {
            if current != session_id {
                self.leave(current).await?;
            }
        }

        info!(%session_id, "peer joining session");
        self.connections
            .add_connection(PeerConnection::new(
                self.peer_id,
                session_id.clone(),
                self.kind(),
                sender,
            ))
            .await?;
        self.sessions
            .add_peer_to_session(session_id.clone(), self.peer_id)
            .await?;
        self.telemetry.register_session(session_id.clone()).await?;

        self.session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(session_id);
        Ok(())
    }

    #[instrument(skip(self), fields(peer_id = %self.peer_id))]
    async fn leave(&self, session_id: SessionId) -> Result<()> {
        info!(%session_id, "peer leaving session");
        self.sessions
            .remove_peer_from_session(session_id, self.peer_id)
            .await?;
        self.connections.remove_connection(self.peer_id).await?;
        self.session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        Ok(())
    }

    async fn publish(&self, channel: Channel, data: Value) -> Result<()> {
        let session_id = self.session().ok_or(ServerError::NotJoined)?;

        // Re-validate on the server; a misbehaving client must not be able
        // to poison the session's subscribers
        if channel.is_validated() {
            decode_payload(channel, data.clone())?;
        }

        if channel == Channel::Telemetry {
            self.persist_telemetry(&session_id, &data).await?;
        }

        let frame = Frame::publish(channel, data);
        self.fanout
            .broadcast(&session_id, &frame, Some(self.peer_id))
            .await?;
        Ok(())
    }

    /// Store what parses as telemetry; the channel is validation-exempt, so
    /// unparseable payloads still flow to subscribers but are not persisted
    async fn persist_telemetry(&self, session_id: &SessionId, data: &Value) -> Result<()> {
        let samples = if data.is_array() {
            serde_json::from_value::<Vec<TelemetrySample>>(data.clone())
        } else {
            serde_json::from_value::<TelemetrySample>(data.clone()).map(|s| vec![s])
        };

        match samples {
            Ok(samples) => {
                let accepted = self.telemetry.append(session_id, samples).await?;
                debug!(accepted, "telemetry persisted");
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "telemetry payload not persistable");
                Ok(())
            }
        }
    }

    /// Tear down this peer's membership when its socket closes
    #[instrument(skip(self), fields(peer_id = %self.peer_id))]
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(session_id) = self.session() {
            self.leave(session_id).await?;
        }
        Ok(())
    }
}
