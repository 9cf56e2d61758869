use crate::error::Result;
use async_trait::async_trait;

/// Raw events surfaced by a physical connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The link came up
    Opened,
    /// The link went down (remote close, network loss, local close)
    Closed,
    /// One inbound text frame
    Message(String),
}

/// Trait for a physical connection (allows substituting an in-memory pair
/// in tests).
///
/// Poll-based: the owning event loop drains `poll_events` on its tick.
pub trait Connection: Send {
    /// Send one text frame. Fails when the link is down; never buffers.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Drain pending events (lifecycle + inbound frames), in arrival order
    fn poll_events(&mut self) -> Vec<ConnectionEvent>;

    fn is_connected(&self) -> bool;

    /// Tear the link down. Idempotent.
    fn close(&mut self);
}

/// Factory for connections, used for the initial connect and by the
/// reconnection controller for every retry.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}
