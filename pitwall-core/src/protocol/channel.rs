use crate::protocol::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The logical channels carried by the distribution layer.
///
/// Two delivery classes exist: high-frequency channels are throttled on the
/// consumer side (intermediate frames coalesce to the latest value), control
/// channels are never throttled because losing or delaying a control message
/// is a correctness bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Per-sample car state, high frequency
    Telemetry,
    /// Competitor standings array, high frequency
    CompetitorData,
    /// Partial driver record update
    DriverUpdate,
    /// Full roster replacement
    DriverList,
    /// Handoff state machine events (request side)
    HandoffRequest,
    /// Handoff state machine events (response side)
    HandoffResponse,
    /// Active-driver change notification
    SwitchDriver,
    /// Free text with priority
    TeamMessage,
    /// Correlated comparison request
    RequestComparison,
    /// Correlated comparison result
    ComparisonResult,
    /// Lap validation diagnostics
    ValidationSummary,
    /// Ask for a lap to be validated
    RequestValidation,
    /// Binary frame data, exempt from validation
    VideoData,
    /// Free-form configuration, exempt from validation
    Config,
}

impl Channel {
    pub const ALL: [Channel; 14] = [
        Channel::Telemetry,
        Channel::CompetitorData,
        Channel::DriverUpdate,
        Channel::DriverList,
        Channel::HandoffRequest,
        Channel::HandoffResponse,
        Channel::SwitchDriver,
        Channel::TeamMessage,
        Channel::RequestComparison,
        Channel::ComparisonResult,
        Channel::ValidationSummary,
        Channel::RequestValidation,
        Channel::VideoData,
        Channel::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Telemetry => "telemetry",
            Channel::CompetitorData => "competitor_data",
            Channel::DriverUpdate => "driver_update",
            Channel::DriverList => "driver_list",
            Channel::HandoffRequest => "handoff_request",
            Channel::HandoffResponse => "handoff_response",
            Channel::SwitchDriver => "switch_driver",
            Channel::TeamMessage => "team_message",
            Channel::RequestComparison => "request_comparison",
            Channel::ComparisonResult => "comparison_result",
            Channel::ValidationSummary => "validation_summary",
            Channel::RequestValidation => "request_validation",
            Channel::VideoData => "video_data",
            Channel::Config => "config",
        }
    }

    /// High-frequency channels whose consumers are rate limited
    pub fn is_throttled(&self) -> bool {
        matches!(self, Channel::Telemetry | Channel::CompetitorData)
    }

    /// Whether payloads on this channel are structurally validated.
    ///
    /// Video frames, telemetry and config are exempt: their payloads are
    /// large, high-frequency or intentionally unconstrained.
    pub fn is_validated(&self) -> bool {
        !matches!(
            self,
            Channel::Telemetry | Channel::VideoData | Channel::Config
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::UnknownChannel(s.to_string()))
    }
}
