use crate::domain::SessionId;
use crate::protocol::{Channel, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which wire-level protocol a connection speaks.
///
/// Both kinds expose identical behavior to the layers above; only the frame
/// encoding differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Multiplexed named-event bus: each logical channel is a distinct named
    /// event on one physical connection, framed as a `[name, payload]` pair
    EventBus,
    /// Raw framed-message stream carrying `{type, data}` envelopes
    Framed,
}

/// Session group membership is a control operation, distinct from channel
/// subscription; these frame types are reserved alongside the channel names.
const JOIN_SESSION: &str = "join_session";
const LEAVE_SESSION: &str = "leave_session";

/// A decoded wire frame, independent of the transport kind that carried it
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An event published on a logical channel
    Publish { channel: Channel, data: Value },
    /// Join a session's broadcast group
    JoinSession { session_id: SessionId },
    /// Leave a session's broadcast group
    LeaveSession { session_id: SessionId },
}

/// `{type, data}` envelope of the framed protocol
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRef {
    session_id: SessionId,
}

impl Frame {
    pub fn publish(channel: Channel, data: Value) -> Self {
        Frame::Publish { channel, data }
    }

    pub fn join(session_id: impl Into<SessionId>) -> Self {
        Frame::JoinSession {
            session_id: session_id.into(),
        }
    }

    pub fn leave(session_id: impl Into<SessionId>) -> Self {
        Frame::LeaveSession {
            session_id: session_id.into(),
        }
    }

    /// Wire-level frame name (channel name or control frame type)
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Publish { channel, .. } => channel.as_str(),
            Frame::JoinSession { .. } => JOIN_SESSION,
            Frame::LeaveSession { .. } => LEAVE_SESSION,
        }
    }

    fn data(&self) -> Result<Value, ValidationError> {
        match self {
            Frame::Publish { data, .. } => Ok(data.clone()),
            Frame::JoinSession { session_id } | Frame::LeaveSession { session_id } => {
                serde_json::to_value(SessionRef {
                    session_id: session_id.clone(),
                })
                .map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))
            }
        }
    }

    fn from_parts(name: &str, data: Value) -> Result<Self, ValidationError> {
        match name {
            JOIN_SESSION | LEAVE_SESSION => {
                let re: SessionRef = serde_json::from_value(data)
                    .map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))?;
                if re.session_id.is_empty() {
                    return Err(ValidationError::MalformedEnvelope(
                        "empty session id".to_string(),
                    ));
                }
                Ok(if name == JOIN_SESSION {
                    Frame::JoinSession {
                        session_id: re.session_id,
                    }
                } else {
                    Frame::LeaveSession {
                        session_id: re.session_id,
                    }
                })
            }
            other => {
                let channel: Channel = other.parse()?;
                Ok(Frame::Publish { channel, data })
            }
        }
    }

    /// Encode for the given transport kind
    pub fn encode(&self, kind: TransportKind) -> Result<String, ValidationError> {
        let result = match kind {
            TransportKind::Framed => serde_json::to_string(&Envelope {
                kind: self.name().to_string(),
                data: self.data()?,
            }),
            TransportKind::EventBus => {
                serde_json::to_string(&(self.name(), self.data()?))
            }
        };
        result.map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))
    }

    /// Decode a frame of the given transport kind
    pub fn decode(kind: TransportKind, raw: &str) -> Result<Self, ValidationError> {
        match kind {
            TransportKind::Framed => {
                let envelope: Envelope = serde_json::from_str(raw)
                    .map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))?;
                Frame::from_parts(&envelope.kind, envelope.data)
            }
            TransportKind::EventBus => {
                let (name, data): (String, Value) = serde_json::from_str(raw)
                    .map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))?;
                Frame::from_parts(&name, data)
            }
        }
    }

    /// Decode a frame of either kind, reporting which kind it was.
    ///
    /// Used by the server, which accepts clients of both transport kinds on
    /// the same listener.
    pub fn decode_any(raw: &str) -> Result<(Self, TransportKind), ValidationError> {
        let kind = match raw.trim_start().chars().next() {
            Some('[') => TransportKind::EventBus,
            Some('{') => TransportKind::Framed,
            _ => {
                return Err(ValidationError::MalformedEnvelope(
                    "frame is neither an envelope nor an event pair".to_string(),
                ))
            }
        };
        Frame::decode(kind, raw).map(|frame| (frame, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_framed_round_trip() {
        let frame = Frame::publish(Channel::TeamMessage, json!({"from": "d1"}));

        let raw = frame.encode(TransportKind::Framed).unwrap();
        assert!(raw.contains("\"type\":\"team_message\""));

        let back = Frame::decode(TransportKind::Framed, &raw).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_event_bus_round_trip() {
        let frame = Frame::publish(Channel::Telemetry, json!({"speed_kph": 200.0}));

        let raw = frame.encode(TransportKind::EventBus).unwrap();
        assert!(raw.starts_with("[\"telemetry\","));

        let back = Frame::decode(TransportKind::EventBus, &raw).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_join_session_frame() {
        let frame = Frame::join("race-1");

        let raw = frame.encode(TransportKind::Framed).unwrap();
        let back = Frame::decode(TransportKind::Framed, &raw).unwrap();

        assert_eq!(
            back,
            Frame::JoinSession {
                session_id: "race-1".into()
            }
        );
    }

    #[test]
    fn test_leave_session_frame() {
        let raw = Frame::leave("race-1").encode(TransportKind::EventBus).unwrap();
        let back = Frame::decode(TransportKind::EventBus, &raw).unwrap();

        assert_eq!(
            back,
            Frame::LeaveSession {
                session_id: "race-1".into()
            }
        );
    }

    #[test]
    fn test_empty_session_id_rejected() {
        let raw = r#"{"type":"join_session","data":{"session_id":""}}"#;
        assert!(Frame::decode(TransportKind::Framed, raw).is_err());
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let raw = r#"{"type":"mystery","data":{}}"#;
        let err = Frame::decode(TransportKind::Framed, raw).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownChannel(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Frame::decode(TransportKind::Framed, "not json").is_err());
        assert!(Frame::decode(TransportKind::EventBus, "{}").is_err());
    }

    #[test]
    fn test_decode_any_detects_kind() {
        let framed = Frame::publish(Channel::Config, json!({})).encode(TransportKind::Framed).unwrap();
        let bus = Frame::publish(Channel::Config, json!({})).encode(TransportKind::EventBus).unwrap();

        let (_, kind) = Frame::decode_any(&framed).unwrap();
        assert_eq!(kind, TransportKind::Framed);

        let (_, kind) = Frame::decode_any(&bus).unwrap();
        assert_eq!(kind, TransportKind::EventBus);

        assert!(Frame::decode_any("garbage").is_err());
    }
}
