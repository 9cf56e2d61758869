// Domain layer (drivers, sessions, coordination state machines)
pub mod domain;

// Wire protocol (channels, payload validation, envelopes)
pub mod protocol;

// Re-exports for convenience
pub use domain::{
    ComparisonCoordinator, ComparisonError, ComparisonOutcome, Driver, DriverId, DriverPatch,
    DriverRole, DriverStatus, HandoffCoordinator, HandoffError, HandoffRequest, HandoffStatus,
    ParticipantError, ParticipantRegistry, SessionId, TelemetrySample, Timestamp,
};
pub use protocol::{
    decode_payload, encode_payload, Channel, ChannelPayload, Frame, TransportKind, ValidationError,
};
