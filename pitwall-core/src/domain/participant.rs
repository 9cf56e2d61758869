use instant::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role within the driving roster - determines who is expected behind the wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverRole {
    /// First-choice driver for the session
    Primary,
    /// Shares stints with the primary driver
    Secondary,
    /// Steps in only when another driver drops out
    Reserve,
}

impl fmt::Display for DriverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverRole::Primary => write!(f, "Primary"),
            DriverRole::Secondary => write!(f, "Secondary"),
            DriverRole::Reserve => write!(f, "Reserve"),
        }
    }
}

/// Live status of a driver within a shared session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    /// Currently in control of the car
    Active,
    /// Connected and ready to take over
    Standby,
    /// Not currently connected
    Offline,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverStatus::Active => write!(f, "Active"),
            DriverStatus::Standby => write!(f, "Standby"),
            DriverStatus::Offline => write!(f, "Offline"),
        }
    }
}

impl Default for DriverStatus {
    fn default() -> Self {
        // Drivers join on standby; control is granted explicitly
        DriverStatus::Standby
    }
}

/// Driver identifier.
///
/// A string newtype rather than a Uuid because driver ids are embedded into
/// composite wire identifiers (comparison ids are `"{a}-{b}-{nonce}"`) and
/// must round-trip through them unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        DriverId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        DriverId(id.to_string())
    }
}

impl From<String> for DriverId {
    fn from(id: String) -> Self {
        DriverId(id)
    }
}

/// Timestamp in milliseconds since application start (monotonic)
///
/// Serializable and comparable, suitable for deterministic ordering of
/// coordination events within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp representing the current moment
    pub fn now() -> Self {
        // Use a static anchor point for all timestamps in the process
        static ANCHOR: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let anchor = ANCHOR.get_or_init(Instant::now);

        let elapsed = Instant::now().duration_since(*anchor);
        Timestamp(elapsed.as_millis() as u64)
    }

    /// Get the raw milliseconds value
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed between this timestamp and a later one
    pub fn millis_until(&self, later: Timestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }

    /// Create a timestamp from a raw milliseconds value
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Errors that can occur when working with drivers
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParticipantError {
    #[error("Driver id cannot be empty")]
    EmptyDriverId,

    #[error("Display name cannot be empty")]
    EmptyName,

    #[error("Display name must be between 1 and 50 characters")]
    InvalidNameLength,

    #[error("Unknown driver: {0}")]
    UnknownDriver(DriverId),
}

/// Domain entity representing one driver in a shared session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Unique identifier within the session
    id: DriverId,
    /// Display name shown on dashboards
    name: String,
    /// Team name, if the driver races for one
    team: Option<String>,
    /// Roster role
    role: DriverRole,
    /// Live status (at most one driver per session is Active)
    status: DriverStatus,
    /// When this driver was first registered (for stable ordering)
    registered_at: Timestamp,
}

impl Driver {
    pub fn new(
        id: impl Into<DriverId>,
        name: impl Into<String>,
        role: DriverRole,
    ) -> Result<Self, ParticipantError> {
        let id = id.into();
        let name = name.into();

        if id.is_empty() {
            return Err(ParticipantError::EmptyDriverId);
        }
        Self::validate_name(&name)?;

        Ok(Driver {
            id,
            name,
            team: None,
            role,
            status: DriverStatus::default(),
            registered_at: Timestamp::now(),
        })
    }

    /// Validate display name according to business rules
    fn validate_name(name: &str) -> Result<(), ParticipantError> {
        if name.is_empty() {
            return Err(ParticipantError::EmptyName);
        }

        if name.len() > 50 {
            return Err(ParticipantError::InvalidNameLength);
        }

        Ok(())
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    // Getters

    pub fn id(&self) -> &DriverId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team(&self) -> Option<&str> {
        self.team.as_deref()
    }

    pub fn role(&self) -> DriverRole {
        self.role
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    pub fn registered_at(&self) -> Timestamp {
        self.registered_at
    }

    /// Check whether this driver currently holds control
    pub fn is_active(&self) -> bool {
        matches!(self.status, DriverStatus::Active)
    }

    // State mutations (applied by the registry, never by transport callbacks)

    pub fn set_status(&mut self, status: DriverStatus) {
        self.status = status;
    }

    /// Merge a partial update onto this driver. Idempotent: applying the
    /// same patch twice yields the same state as applying it once.
    pub fn apply(&mut self, patch: &DriverPatch) -> Result<(), ParticipantError> {
        if let Some(name) = &patch.name {
            Self::validate_name(name)?;
            self.name = name.clone();
        }
        if let Some(team) = &patch.team {
            self.team = Some(team.clone());
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        Ok(())
    }
}

/// Partial driver update, as carried on the `driver_update` channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPatch {
    pub id: DriverId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<DriverRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DriverStatus>,
}

impl DriverPatch {
    pub fn new(id: impl Into<DriverId>) -> Self {
        DriverPatch {
            id: id.into(),
            name: None,
            team: None,
            role: None,
            status: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn role(mut self, role: DriverRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn status(mut self, status: DriverStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_driver() {
        let driver = Driver::new("d1", "Alice", DriverRole::Primary).unwrap();

        assert_eq!(driver.id().as_str(), "d1");
        assert_eq!(driver.name(), "Alice");
        assert_eq!(driver.role(), DriverRole::Primary);
        assert_eq!(driver.status(), DriverStatus::Standby);
        assert!(!driver.is_active());
        assert!(driver.team().is_none());
    }

    #[test]
    fn test_driver_with_team() {
        let driver = Driver::new("d1", "Alice", DriverRole::Primary)
            .unwrap()
            .with_team("Apex Racing");

        assert_eq!(driver.team(), Some("Apex Racing"));
    }

    #[test]
    fn test_empty_id_validation() {
        let result = Driver::new("", "Alice", DriverRole::Primary);
        assert_eq!(result, Err(ParticipantError::EmptyDriverId));
    }

    #[test]
    fn test_empty_name_validation() {
        let result = Driver::new("d1", "", DriverRole::Primary);
        assert_eq!(result, Err(ParticipantError::EmptyName));
    }

    #[test]
    fn test_name_length_validation() {
        let long_name = "a".repeat(51);
        let result = Driver::new("d1", long_name, DriverRole::Primary);
        assert_eq!(result, Err(ParticipantError::InvalidNameLength));
    }

    #[test]
    fn test_apply_patch() {
        let mut driver = Driver::new("d1", "Alice", DriverRole::Secondary).unwrap();

        let patch = DriverPatch::new("d1")
            .name("Alicia")
            .team("Apex Racing")
            .role(DriverRole::Primary)
            .status(DriverStatus::Active);

        driver.apply(&patch).unwrap();

        assert_eq!(driver.name(), "Alicia");
        assert_eq!(driver.team(), Some("Apex Racing"));
        assert_eq!(driver.role(), DriverRole::Primary);
        assert!(driver.is_active());
    }

    #[test]
    fn test_apply_patch_is_idempotent() {
        let mut driver = Driver::new("d1", "Alice", DriverRole::Secondary).unwrap();
        let patch = DriverPatch::new("d1").name("Alicia").status(DriverStatus::Active);

        driver.apply(&patch).unwrap();
        let after_once = driver.clone();

        driver.apply(&patch).unwrap();
        assert_eq!(driver, after_once);
    }

    #[test]
    fn test_apply_patch_rejects_invalid_name() {
        let mut driver = Driver::new("d1", "Alice", DriverRole::Primary).unwrap();
        let patch = DriverPatch::new("d1").name("");

        assert_eq!(driver.apply(&patch), Err(ParticipantError::EmptyName));
        // Name unchanged on rejection
        assert_eq!(driver.name(), "Alice");
    }

    #[test]
    fn test_patch_partial_fields_leave_rest_untouched() {
        let mut driver = Driver::new("d1", "Alice", DriverRole::Primary)
            .unwrap()
            .with_team("Apex Racing");

        driver.apply(&DriverPatch::new("d1").status(DriverStatus::Offline)).unwrap();

        assert_eq!(driver.name(), "Alice");
        assert_eq!(driver.team(), Some("Apex Racing"));
        assert_eq!(driver.status(), DriverStatus::Offline);
    }

    #[test]
    fn test_display_role_and_status() {
        assert_eq!(DriverRole::Primary.to_string(), "Primary");
        assert_eq!(DriverRole::Reserve.to_string(), "Reserve");
        assert_eq!(DriverStatus::Active.to_string(), "Active");
        assert_eq!(DriverStatus::Offline.to_string(), "Offline");
    }

    #[test]
    fn test_status_default_is_standby() {
        assert_eq!(DriverStatus::default(), DriverStatus::Standby);
    }

    #[test]
    fn test_driver_id_display_round_trip() {
        let id = DriverId::new("d42");
        assert_eq!(id.to_string(), "d42");
        assert_eq!(DriverId::from("d42"), id);
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);

        assert!(t1 < t2);
        assert_eq!(t1.millis_until(t2), 100);
        assert_eq!(t2.millis_until(t1), 0);
    }

    #[test]
    fn test_timestamp_now_is_monotonic() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t2 = Timestamp::now();

        assert!(t2 > t1);
    }

    #[test]
    fn test_driver_serialization() {
        let driver = Driver::new("d1", "Alice", DriverRole::Primary)
            .unwrap()
            .with_team("Apex Racing");

        let json = serde_json::to_string(&driver).unwrap();
        let deserialized: Driver = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, driver);
    }

    #[test]
    fn test_patch_deserializes_with_missing_fields() {
        let patch: DriverPatch = serde_json::from_str(r#"{"id":"d1","status":"active"}"#).unwrap();

        assert_eq!(patch.id.as_str(), "d1");
        assert_eq!(patch.status, Some(DriverStatus::Active));
        assert!(patch.name.is_none());
        assert!(patch.role.is_none());
    }
}
