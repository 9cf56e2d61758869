use crate::domain::{Driver, DriverId, DriverPatch, DriverRole, DriverStatus, ParticipantError};
use tracing::{debug, warn};

/// Authoritative list of drivers in a session plus the active-driver pointer.
///
/// Invariant: at most one driver has status `Active` at any time, and the
/// `active` pointer names exactly that driver (or nothing). All mutation goes
/// through these methods; transport callbacks translate wire events into
/// calls here and never touch driver state directly.
#[derive(Debug, Default, Clone)]
pub struct ParticipantRegistry {
    drivers: Vec<Driver>,
    active: Option<DriverId>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster (full `driver_list` update).
    ///
    /// The incoming statuses are taken as authoritative, except that if the
    /// list claims more than one active driver, only the first is kept active
    /// and the rest are demoted to standby.
    pub fn set_participants(&mut self, drivers: Vec<Driver>) {
        self.drivers = drivers;
        self.active = None;

        for driver in &mut self.drivers {
            if driver.is_active() {
                if self.active.is_none() {
                    self.active = Some(driver.id().clone());
                } else {
                    warn!(driver = %driver.id(), "roster claims multiple active drivers, demoting");
                    driver.set_status(DriverStatus::Standby);
                }
            }
        }

        debug!(count = self.drivers.len(), active = ?self.active, "roster replaced");
    }

    /// Hand control to a registered driver.
    ///
    /// Unknown ids are rejected without any state change: the registry never
    /// marks an active driver that isn't registered. The previously active
    /// driver drops to standby. Idempotent when the driver is already active.
    pub fn set_active(&mut self, id: &DriverId) -> Result<(), ParticipantError> {
        if !self.drivers.iter().any(|d| d.id() == id) {
            warn!(driver = %id, "set_active rejected: unknown driver");
            return Err(ParticipantError::UnknownDriver(id.clone()));
        }

        for driver in &mut self.drivers {
            if driver.id() == id {
                driver.set_status(DriverStatus::Active);
            } else if driver.is_active() {
                driver.set_status(DriverStatus::Standby);
            }
        }
        self.active = Some(id.clone());

        debug!(driver = %id, "active driver changed");
        Ok(())
    }

    /// Merge a partial update onto an existing driver, or insert a new record
    /// if the id is unseen. Idempotent.
    pub fn upsert(&mut self, patch: &DriverPatch) -> Result<(), ParticipantError> {
        if patch.id.is_empty() {
            return Err(ParticipantError::EmptyDriverId);
        }

        match self.drivers.iter_mut().find(|d| d.id() == &patch.id) {
            Some(driver) => driver.apply(patch)?,
            None => {
                // Unseen id: build a record from the patch, falling back to
                // the id as display name when none was supplied
                let name = patch.name.clone().unwrap_or_else(|| patch.id.to_string());
                let role = patch.role.unwrap_or(DriverRole::Reserve);
                let mut driver = Driver::new(patch.id.clone(), name, role)?;
                driver.apply(patch)?;
                self.drivers.push(driver);
            }
        }

        // Re-establish the single-active invariant if the patch granted or
        // revoked control
        if patch.status == Some(DriverStatus::Active) {
            let id = patch.id.clone();
            self.set_active(&id)?;
        } else if patch.status.is_some() && self.active.as_ref() == Some(&patch.id) {
            self.active = None;
        }

        Ok(())
    }

    pub fn get(&self, id: &DriverId) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id() == id)
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn active(&self) -> Option<&DriverId> {
        self.active.as_ref()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
