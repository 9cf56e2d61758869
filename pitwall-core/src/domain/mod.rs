pub mod comparison;
pub mod handoff;
pub mod participant;
pub mod registry;
pub mod sample;
pub mod session;

pub use comparison::{
    ComparisonCoordinator, ComparisonError, ComparisonMetric, ComparisonOutcome,
    ComparisonRequestEvent, ComparisonResultEvent, MetricOutcome,
};
pub use handoff::{HandoffCoordinator, HandoffError, HandoffEvent, HandoffRequest, HandoffStatus};
pub use participant::{
    Driver, DriverId, DriverPatch, DriverRole, DriverStatus, ParticipantError, Timestamp,
};
pub use registry::ParticipantRegistry;
pub use sample::{TelemetrySample, TireTemps};
pub use session::SessionId;
