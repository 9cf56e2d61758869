use crate::domain::{
    ComparisonRequestEvent, ComparisonResultEvent, Driver, DriverId, DriverPatch, HandoffEvent,
};
use crate::protocol::{Channel, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Competitor standings entry, as carried on `competitor_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorEntry {
    pub driver_id: DriverId,
    pub car_number: u32,
    /// 1-based running-order position
    pub position: u32,
    pub last_lap_ms: u64,
    /// Gap to the session leader in milliseconds
    pub gap_to_leader_ms: i64,
}

/// Message urgency for the team radio channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Info,
    Caution,
    Urgent,
}

/// Free-text message between session members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMessage {
    pub from: DriverId,
    pub text: String,
    pub priority: MessagePriority,
}

/// Active-driver change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchDriver {
    pub driver_id: DriverId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<DriverId>,
}

/// Lap validation diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub driver_id: DriverId,
    pub laps_checked: u32,
    pub issues: Vec<String>,
}

/// Ask the backend to validate a specific lap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestValidation {
    pub driver_id: DriverId,
    pub lap: u32,
}

/// Every payload shape the distribution layer knows how to carry.
///
/// One variant per channel. The deliberately-unvalidated channels (video,
/// config) and the high-frequency telemetry stream keep their payloads as
/// raw JSON rather than a blanket "any" type leaking everywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    Telemetry(Value),
    CompetitorData(Vec<CompetitorEntry>),
    DriverUpdate(DriverPatch),
    DriverList(Vec<Driver>),
    HandoffRequest(HandoffEvent),
    HandoffResponse(HandoffEvent),
    SwitchDriver(SwitchDriver),
    TeamMessage(TeamMessage),
    RequestComparison(ComparisonRequestEvent),
    ComparisonResult(ComparisonResultEvent),
    ValidationSummary(ValidationSummary),
    RequestValidation(RequestValidation),
    VideoData(Value),
    Config(Value),
}

impl ChannelPayload {
    /// The channel this payload travels on
    pub fn channel(&self) -> Channel {
        match self {
            ChannelPayload::Telemetry(_) => Channel::Telemetry,
            ChannelPayload::CompetitorData(_) => Channel::CompetitorData,
            ChannelPayload::DriverUpdate(_) => Channel::DriverUpdate,
            ChannelPayload::DriverList(_) => Channel::DriverList,
            ChannelPayload::HandoffRequest(_) => Channel::HandoffRequest,
            ChannelPayload::HandoffResponse(_) => Channel::HandoffResponse,
            ChannelPayload::SwitchDriver(_) => Channel::SwitchDriver,
            ChannelPayload::TeamMessage(_) => Channel::TeamMessage,
            ChannelPayload::RequestComparison(_) => Channel::RequestComparison,
            ChannelPayload::ComparisonResult(_) => Channel::ComparisonResult,
            ChannelPayload::ValidationSummary(_) => Channel::ValidationSummary,
            ChannelPayload::RequestValidation(_) => Channel::RequestValidation,
            ChannelPayload::VideoData(_) => Channel::VideoData,
            ChannelPayload::Config(_) => Channel::Config,
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    channel: Channel,
    value: Value,
) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|source| ValidationError::MalformedPayload {
        channel,
        source,
    })
}

/// Check a raw payload against the expected shape for its channel.
///
/// Symmetric: the same function guards both directions of the boundary.
/// Exempt channels pass through as raw JSON.
pub fn decode_payload(channel: Channel, value: Value) -> Result<ChannelPayload, ValidationError> {
    Ok(match channel {
        Channel::Telemetry => ChannelPayload::Telemetry(value),
        Channel::VideoData => ChannelPayload::VideoData(value),
        Channel::Config => ChannelPayload::Config(value),

        Channel::CompetitorData => ChannelPayload::CompetitorData(typed(channel, value)?),
        Channel::DriverUpdate => ChannelPayload::DriverUpdate(typed(channel, value)?),
        Channel::DriverList => ChannelPayload::DriverList(typed(channel, value)?),
        Channel::HandoffRequest => ChannelPayload::HandoffRequest(typed(channel, value)?),
        Channel::HandoffResponse => ChannelPayload::HandoffResponse(typed(channel, value)?),
        Channel::SwitchDriver => ChannelPayload::SwitchDriver(typed(channel, value)?),
        Channel::TeamMessage => ChannelPayload::TeamMessage(typed(channel, value)?),
        Channel::RequestComparison => ChannelPayload::RequestComparison(typed(channel, value)?),
        Channel::ComparisonResult => ChannelPayload::ComparisonResult(typed(channel, value)?),
        Channel::ValidationSummary => ChannelPayload::ValidationSummary(typed(channel, value)?),
        Channel::RequestValidation => ChannelPayload::RequestValidation(typed(channel, value)?),
    })
}

/// Serialize a payload back to its wire value
pub fn encode_payload(payload: &ChannelPayload) -> Result<(Channel, Value), ValidationError> {
    let channel = payload.channel();
    let value = match payload {
        ChannelPayload::Telemetry(v)
        | ChannelPayload::VideoData(v)
        | ChannelPayload::Config(v) => Ok(v.clone()),

        ChannelPayload::CompetitorData(p) => serde_json::to_value(p),
        ChannelPayload::DriverUpdate(p) => serde_json::to_value(p),
        ChannelPayload::DriverList(p) => serde_json::to_value(p),
        ChannelPayload::HandoffRequest(p) | ChannelPayload::HandoffResponse(p) => {
            serde_json::to_value(p)
        }
        ChannelPayload::SwitchDriver(p) => serde_json::to_value(p),
        ChannelPayload::TeamMessage(p) => serde_json::to_value(p),
        ChannelPayload::RequestComparison(p) => serde_json::to_value(p),
        ChannelPayload::ComparisonResult(p) => serde_json::to_value(p),
        ChannelPayload::ValidationSummary(p) => serde_json::to_value(p),
        ChannelPayload::RequestValidation(p) => serde_json::to_value(p),
    }
    .map_err(|source| ValidationError::MalformedPayload { channel, source })?;

    Ok((channel, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HandoffStatus;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_decode_valid_handoff_request() {
        let value = json!({
            "request_id": Uuid::new_v4(),
            "from": "d1",
            "to": "d2",
            "status": "pending"
        });

        let payload = decode_payload(Channel::HandoffRequest, value).unwrap();

        match payload {
            ChannelPayload::HandoffRequest(event) => {
                assert_eq!(event.from.as_str(), "d1");
                assert_eq!(event.status, HandoffStatus::Pending);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_handoff_rejected() {
        // `to` missing entirely
        let value = json!({"request_id": Uuid::new_v4(), "from": "d1", "status": "pending"});

        let err = decode_payload(Channel::HandoffRequest, value).unwrap_err();
        assert!(
            matches!(err, ValidationError::MalformedPayload { channel, .. } if channel == Channel::HandoffRequest)
        );
    }

    #[test]
    fn test_exempt_channels_pass_through() {
        // Arbitrary shapes survive on exempt channels
        let blob = json!({"whatever": [1, 2, 3], "nested": {"deep": true}});

        for channel in [Channel::Telemetry, Channel::VideoData, Channel::Config] {
            let payload = decode_payload(channel, blob.clone()).unwrap();
            assert_eq!(payload.channel(), channel);
        }
    }

    #[test]
    fn test_decode_competitor_data() {
        let value = json!([{
            "driver_id": "d3",
            "car_number": 7,
            "position": 1,
            "last_lap_ms": 91500,
            "gap_to_leader_ms": 0
        }]);

        let payload = decode_payload(Channel::CompetitorData, value).unwrap();
        match payload {
            ChannelPayload::CompetitorData(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].position, 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_decode_competitor_data_wrong_shape_rejected() {
        // Object where an array is expected
        let value = json!({"driver_id": "d3"});
        assert!(decode_payload(Channel::CompetitorData, value).is_err());
    }

    #[test]
    fn test_decode_team_message() {
        let value = json!({"from": "d1", "text": "box box", "priority": "urgent"});

        let payload = decode_payload(Channel::TeamMessage, value).unwrap();
        match payload {
            ChannelPayload::TeamMessage(msg) => {
                assert_eq!(msg.priority, MessagePriority::Urgent);
                assert_eq!(msg.text, "box box");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_encode_decode_symmetry() {
        let original = ChannelPayload::SwitchDriver(SwitchDriver {
            driver_id: "d2".into(),
            initiated_by: Some("d1".into()),
        });

        let (channel, value) = encode_payload(&original).unwrap();
        assert_eq!(channel, Channel::SwitchDriver);

        let back = decode_payload(channel, value).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_channel_mapping_is_total() {
        // Every channel decodes something (even if just raw passthrough)
        for channel in Channel::ALL {
            let probe = if channel.is_validated() {
                // Validated channels reject a bare string...
                decode_payload(channel, json!("probe")).is_err()
            } else {
                // ...exempt ones accept anything
                decode_payload(channel, json!("probe")).is_ok()
            };
            assert!(probe, "channel {channel} validation class mismatch");
        }
    }
}
