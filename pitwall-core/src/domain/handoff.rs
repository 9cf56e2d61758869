use crate::domain::{DriverId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of a handoff request.
///
/// `pending -> confirmed -> completed`, or `pending -> cancelled`.
///
/// Canonical mapping: `Confirmed` means the target accepted and is
/// preparing to take over; it is NOT terminal. Only the explicit
/// `Completed` transition moves the active-driver pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl HandoffStatus {
    /// Terminal states are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffStatus::Cancelled | HandoffStatus::Completed)
    }

    fn can_transition_to(&self, next: HandoffStatus) -> bool {
        matches!(
            (self, next),
            (HandoffStatus::Pending, HandoffStatus::Confirmed)
                | (HandoffStatus::Pending, HandoffStatus::Cancelled)
                | (HandoffStatus::Confirmed, HandoffStatus::Completed)
        )
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffStatus::Pending => write!(f, "pending"),
            HandoffStatus::Confirmed => write!(f, "confirmed"),
            HandoffStatus::Cancelled => write!(f, "cancelled"),
            HandoffStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Errors raised by handoff coordination.
///
/// These surface synchronously to the caller; coordination-input failures
/// never reach the transport.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HandoffError {
    #[error("Handoff {0} participant id is empty")]
    MissingParticipant(&'static str),

    #[error("Invalid handoff transition: {from} -> {to}")]
    InvalidTransition {
        from: HandoffStatus,
        to: HandoffStatus,
    },

    #[error("Unknown handoff request: {0}")]
    UnknownRequest(Uuid),
}

/// Wire event for the `handoff_request` / `handoff_response` channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEvent {
    pub request_id: Uuid,
    pub from: DriverId,
    pub to: DriverId,
    pub status: HandoffStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One transfer of active-driver status between two participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    id: Uuid,
    from: DriverId,
    to: DriverId,
    notes: Option<String>,
    status: HandoffStatus,
    created_at: Timestamp,
}

impl HandoffRequest {
    /// Create a pending request. Empty participant ids are rejected here,
    /// before anything can reach a transport.
    pub fn new(
        from: impl Into<DriverId>,
        to: impl Into<DriverId>,
        notes: Option<String>,
    ) -> Result<Self, HandoffError> {
        let from = from.into();
        let to = to.into();

        if from.is_empty() {
            return Err(HandoffError::MissingParticipant("from"));
        }
        if to.is_empty() {
            return Err(HandoffError::MissingParticipant("to"));
        }

        Ok(HandoffRequest {
            id: Uuid::new_v4(),
            from,
            to,
            notes,
            status: HandoffStatus::Pending,
            created_at: Timestamp::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn from(&self) -> &DriverId {
        &self.from
    }

    pub fn to(&self) -> &DriverId {
        &self.to
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> HandoffStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// The wire event announcing this request's current state
    pub fn to_event(&self) -> HandoffEvent {
        HandoffEvent {
            request_id: self.id,
            from: self.from.clone(),
            to: self.to.clone(),
            status: self.status,
            notes: self.notes.clone(),
        }
    }

    fn transition(&mut self, next: HandoffStatus) -> Result<(), HandoffError> {
        if !self.status.can_transition_to(next) {
            return Err(HandoffError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        debug!(request = %self.id, from = %self.status, to = %next, "handoff transition");
        self.status = next;
        Ok(())
    }
}

/// State machine governing active-driver transfers.
///
/// The coordinator does not own driver state: `complete` returns the target
/// driver id and the caller applies it to the registry.
#[derive(Debug, Default)]
pub struct HandoffCoordinator {
    requests: HashMap<Uuid, HandoffRequest>,
}

impl HandoffCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a new pending request
    pub fn initiate(
        &mut self,
        from: impl Into<DriverId>,
        to: impl Into<DriverId>,
        notes: Option<String>,
    ) -> Result<HandoffRequest, HandoffError> {
        let request = HandoffRequest::new(from, to, notes)?;
        self.requests.insert(request.id(), request.clone());
        Ok(request)
    }

    /// Target accepts: pending -> confirmed
    pub fn confirm(&mut self, id: Uuid) -> Result<&HandoffRequest, HandoffError> {
        self.transition(id, HandoffStatus::Confirmed)
    }

    /// Either side backs out: pending -> cancelled (terminal)
    pub fn cancel(&mut self, id: Uuid) -> Result<&HandoffRequest, HandoffError> {
        self.transition(id, HandoffStatus::Cancelled)
    }

    /// Explicit completion: confirmed -> completed (terminal).
    ///
    /// Returns the driver who now holds control, for the registry to apply.
    pub fn complete(&mut self, id: Uuid) -> Result<DriverId, HandoffError> {
        let request = self.transition(id, HandoffStatus::Completed)?;
        Ok(request.to().clone())
    }

    /// Apply a remote handoff event (from the `handoff_request` or
    /// `handoff_response` channel).
    ///
    /// Unknown request ids are inserted; known ones advance through the
    /// state machine. Returns the target driver id when this event newly
    /// completed the handoff, so the caller can move the active pointer.
    pub fn apply_remote(&mut self, event: &HandoffEvent) -> Result<Option<DriverId>, HandoffError> {
        match self.requests.get_mut(&event.request_id) {
            None => {
                if event.from.is_empty() {
                    return Err(HandoffError::MissingParticipant("from"));
                }
                if event.to.is_empty() {
                    return Err(HandoffError::MissingParticipant("to"));
                }
                // First sight of this request; adopt its state as-is. A
                // remote request can legitimately arrive already confirmed
                // when we joined mid-handoff.
                let request = HandoffRequest {
                    id: event.request_id,
                    from: event.from.clone(),
                    to: event.to.clone(),
                    notes: event.notes.clone(),
                    status: event.status,
                    created_at: Timestamp::now(),
                };
                let completed = matches!(event.status, HandoffStatus::Completed)
                    .then(|| request.to.clone());
                self.requests.insert(event.request_id, request);
                Ok(completed)
            }
            Some(request) => {
                if request.status == event.status {
                    // Duplicate delivery of the same state; a handoff must
                    // never be applied twice
                    return Ok(None);
                }
                request.transition(event.status)?;
                Ok(matches!(event.status, HandoffStatus::Completed)
                    .then(|| request.to.clone()))
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&HandoffRequest> {
        self.requests.get(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn transition(&mut self, id: Uuid, next: HandoffStatus) -> Result<&HandoffRequest, HandoffError> {
        match self.requests.get_mut(&id) {
            None => {
                warn!(request = %id, "transition on unknown handoff request");
                Err(HandoffError::UnknownRequest(id))
            }
            Some(request) => {
                request.transition(next)?;
                Ok(&*request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_creates_pending() {
        let mut coordinator = HandoffCoordinator::new();
        let request = coordinator.initiate("d1", "d2", None).unwrap();

        assert_eq!(request.status(), HandoffStatus::Pending);
        assert_eq!(request.from().as_str(), "d1");
        assert_eq!(request.to().as_str(), "d2");
        assert_eq!(coordinator.len(), 1);
    }

    #[test]
    fn test_empty_from_rejected() {
        let mut coordinator = HandoffCoordinator::new();
        let result = coordinator.initiate("", "d2", None);

        assert_eq!(result, Err(HandoffError::MissingParticipant("from")));
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_empty_to_rejected() {
        let mut coordinator = HandoffCoordinator::new();
        let result = coordinator.initiate("d1", "", None);

        assert_eq!(result, Err(HandoffError::MissingParticipant("to")));
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_happy_path_pending_confirmed_completed() {
        let mut coordinator = HandoffCoordinator::new();
        let id = coordinator.initiate("d1", "d2", None).unwrap().id();

        coordinator.confirm(id).unwrap();
        assert_eq!(coordinator.get(id).unwrap().status(), HandoffStatus::Confirmed);

        let new_active = coordinator.complete(id).unwrap();
        assert_eq!(new_active.as_str(), "d2");
        assert_eq!(coordinator.get(id).unwrap().status(), HandoffStatus::Completed);
    }

    #[test]
    fn test_cancel_from_pending() {
        let mut coordinator = HandoffCoordinator::new();
        let id = coordinator.initiate("d1", "d2", None).unwrap().id();

        coordinator.cancel(id).unwrap();
        assert_eq!(coordinator.get(id).unwrap().status(), HandoffStatus::Cancelled);
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut coordinator = HandoffCoordinator::new();
        let id = coordinator.initiate("d1", "d2", None).unwrap().id();

        let result = coordinator.complete(id);

        assert_eq!(
            result,
            Err(HandoffError::InvalidTransition {
                from: HandoffStatus::Pending,
                to: HandoffStatus::Completed,
            })
        );
    }

    #[test]
    fn test_terminal_states_never_resurrected() {
        let mut coordinator = HandoffCoordinator::new();
        let id = coordinator.initiate("d1", "d2", None).unwrap().id();
        coordinator.cancel(id).unwrap();

        assert!(coordinator.confirm(id).is_err());
        assert!(coordinator.complete(id).is_err());
        assert_eq!(coordinator.get(id).unwrap().status(), HandoffStatus::Cancelled);
    }

    #[test]
    fn test_transition_on_unknown_request() {
        let mut coordinator = HandoffCoordinator::new();
        let id = Uuid::new_v4();

        assert_eq!(coordinator.confirm(id), Err(HandoffError::UnknownRequest(id)));
    }

    #[test]
    fn test_apply_remote_inserts_unknown_request() {
        let mut coordinator = HandoffCoordinator::new();
        let event = HandoffEvent {
            request_id: Uuid::new_v4(),
            from: "d1".into(),
            to: "d2".into(),
            status: HandoffStatus::Pending,
            notes: None,
        };

        let completed = coordinator.apply_remote(&event).unwrap();

        assert_eq!(completed, None);
        assert_eq!(
            coordinator.get(event.request_id).unwrap().status(),
            HandoffStatus::Pending
        );
    }

    #[test]
    fn test_apply_remote_completion_returns_target() {
        let mut coordinator = HandoffCoordinator::new();
        let request = coordinator.initiate("d1", "d2", None).unwrap();
        let id = request.id();

        let mut event = request.to_event();
        event.status = HandoffStatus::Confirmed;
        assert_eq!(coordinator.apply_remote(&event).unwrap(), None);

        event.status = HandoffStatus::Completed;
        let completed = coordinator.apply_remote(&event).unwrap();
        assert_eq!(completed, Some(DriverId::from("d2")));
        assert_eq!(coordinator.get(id).unwrap().status(), HandoffStatus::Completed);
    }

    #[test]
    fn test_apply_remote_duplicate_completion_is_not_applied_twice() {
        let mut coordinator = HandoffCoordinator::new();
        let request = coordinator.initiate("d1", "d2", None).unwrap();

        let mut event = request.to_event();
        event.status = HandoffStatus::Confirmed;
        coordinator.apply_remote(&event).unwrap();
        event.status = HandoffStatus::Completed;

        assert_eq!(
            coordinator.apply_remote(&event).unwrap(),
            Some(DriverId::from("d2"))
        );
        // Redelivery of the same terminal event yields nothing
        assert_eq!(coordinator.apply_remote(&event).unwrap(), None);
    }

    #[test]
    fn test_apply_remote_invalid_transition() {
        let mut coordinator = HandoffCoordinator::new();
        let request = coordinator.initiate("d1", "d2", None).unwrap();

        let mut event = request.to_event();
        event.status = HandoffStatus::Completed;

        // pending -> completed skips confirmation
        assert!(coordinator.apply_remote(&event).is_err());
    }

    #[test]
    fn test_apply_remote_rejects_empty_participants() {
        let mut coordinator = HandoffCoordinator::new();
        let event = HandoffEvent {
            request_id: Uuid::new_v4(),
            from: "".into(),
            to: "d2".into(),
            status: HandoffStatus::Pending,
            notes: None,
        };

        assert_eq!(
            coordinator.apply_remote(&event),
            Err(HandoffError::MissingParticipant("from"))
        );
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let request = HandoffRequest::new("d1", "d2", Some("box this lap".into())).unwrap();
        let event = request.to_event();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"pending\""));

        let back: HandoffEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
