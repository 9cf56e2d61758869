use crate::infrastructure::connection::{Connection, ConnectionEvent};
use pitwall_core::protocol::{Frame, TransportKind};
use tracing::{debug, warn};

/// Transport-level events after frame decoding
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link came up (deduplicated)
    Connected,
    /// The link went down (deduplicated)
    Disconnected,
    /// One decoded inbound frame
    Frame(Frame),
}

/// Wraps a physical connection with frame encoding and lifecycle
/// deduplication.
///
/// Sends encode in the configured wire dialect; inbound frames are decoded
/// from either dialect, so a peer speaking the other one still gets through.
/// Repeated raw open/close events collapse to single transitions.
pub struct Transport {
    connection: Box<dyn Connection>,
    kind: TransportKind,
    link_up: bool,
}

impl Transport {
    pub fn new(connection: Box<dyn Connection>, kind: TransportKind) -> Self {
        Transport {
            connection,
            kind,
            link_up: false,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Encode and send one frame. Returns whether it went out; a send while
    /// disconnected is dropped with a warning, not an error.
    pub fn send(&mut self, frame: &Frame) -> bool {
        let encoded = match frame.encode(self.kind) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
                return false;
            }
        };

        if let Err(e) = self.connection.send(encoded) {
            warn!(error = %e, frame = frame.name(), "dropping outbound frame, link is down");
            return false;
        }
        true
    }

    /// Drain raw connection events into decoded transport events
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        for raw in self.connection.poll_events() {
            match raw {
                ConnectionEvent::Opened => {
                    if !self.link_up {
                        self.link_up = true;
                        events.push(TransportEvent::Connected);
                    }
                }
                ConnectionEvent::Closed => {
                    if self.link_up {
                        self.link_up = false;
                        events.push(TransportEvent::Disconnected);
                    }
                }
                ConnectionEvent::Message(text) => match Frame::decode_any(&text) {
                    Ok((frame, _kind)) => events.push(TransportEvent::Frame(frame)),
                    Err(e) => {
                        debug!(error = %e, "discarding undecodable frame");
                    }
                },
            }
        }
        events
    }

    pub fn close(&mut self) {
        self.connection.close();
        self.link_up = false;
    }
}
