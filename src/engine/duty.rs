use std::collections::HashMap;

use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{lock, Engine, EngineError};

/// Standing driver↔vehicle duty pairings. Independent of per-booking trips.
#[derive(Default)]
pub(super) struct DutyRoster {
    duties: HashMap<Ulid, DutyAssignment>,
    open_by_driver: HashMap<Ulid, Ulid>,
    open_by_vehicle: HashMap<Ulid, Ulid>,
}

impl DutyRoster {
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::DutyAssigned { id, driver_id, vehicle_id, at, .. } => self.insert(DutyAssignment {
                id: *id,
                driver_id: *driver_id,
                vehicle_id: *vehicle_id,
                assigned_at: *at,
                released_at: None,
            }),
            Event::DutyReleased { id, at, .. } => {
                if let Some(duty) = self.duties.get_mut(id) {
                    duty.released_at = Some(*at);
                    self.open_by_driver.remove(&duty.driver_id);
                    self.open_by_vehicle.remove(&duty.vehicle_id);
                }
            }
            Event::DutyRestored { duty } => self.insert(duty.clone()),
            _ => {}
        }
    }

    fn insert(&mut self, duty: DutyAssignment) {
        if duty.is_open() {
            self.open_by_driver.insert(duty.driver_id, duty.id);
            self.open_by_vehicle.insert(duty.vehicle_id, duty.id);
        }
        self.duties.insert(duty.id, duty);
    }

    pub fn open_for_driver(&self, driver_id: &Ulid) -> Option<&DutyAssignment> {
        self.open_by_driver
            .get(driver_id)
            .and_then(|id| self.duties.get(id))
    }

    pub fn open_for_vehicle(&self, vehicle_id: &Ulid) -> Option<&DutyAssignment> {
        self.open_by_vehicle
            .get(vehicle_id)
            .and_then(|id| self.duties.get(id))
    }

    /// Newest first.
    pub fn history(&self, driver_id: &Ulid) -> Vec<DutyAssignment> {
        let mut out: Vec<DutyAssignment> = self
            .duties
            .values()
            .filter(|d| d.driver_id == *driver_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at).then(b.id.cmp(&a.id)));
        out
    }

    pub fn snapshot(&self) -> Vec<DutyAssignment> {
        let mut out: Vec<DutyAssignment> = self.duties.values().cloned().collect();
        out.sort_by_key(|d| d.id);
        out
    }
}

impl Engine {
    /// Put an active driver on duty with a vehicle. A driver holds at most
    /// one open duty, and so does a vehicle.
    pub async fn assign_duty(
        &self,
        actor: &Actor,
        driver_id: Ulid,
        vehicle_id: Ulid,
    ) -> Result<DutyAssignment, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can assign duty"));
        }
        let _duty = self.duty_lock.lock().await;
        let driver = self
            .directory
            .driver(&driver_id)
            .ok_or(EngineError::NotFound("driver", driver_id))?;
        if !driver.active {
            return Err(EngineError::forbidden("cannot assign a vehicle to an inactive driver"));
        }
        self.directory
            .vehicle(&vehicle_id)
            .ok_or(EngineError::NotFound("vehicle", vehicle_id))?;

        let (driver_busy, vehicle_busy) = {
            let roster = lock(&self.duties);
            (
                roster.open_for_driver(&driver_id).is_some(),
                roster.open_for_vehicle(&vehicle_id).is_some(),
            )
        };
        if driver_busy {
            return Err(EngineError::forbidden(
                "driver already has an active vehicle assignment; release it first",
            ));
        }
        if vehicle_busy {
            return Err(EngineError::forbidden("vehicle is already assigned to another driver"));
        }

        let id = Ulid::new();
        let event = Event::DutyAssigned {
            id,
            driver_id,
            vehicle_id,
            actor: Some(actor.id),
            at: self.now(),
        };
        self.persist(&event).await?;
        info!("driver {driver_id} on duty with vehicle {vehicle_id}");
        lock(&self.duties)
            .open_for_driver(&driver_id)
            .cloned()
            .ok_or(EngineError::NotFound("duty assignment", id))
    }

    pub async fn release_duty(&self, actor: &Actor, driver_id: Ulid) -> Result<DutyAssignment, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can release duty"));
        }
        let _duty = self.duty_lock.lock().await;
        self.directory
            .driver(&driver_id)
            .ok_or(EngineError::NotFound("driver", driver_id))?;
        let open = lock(&self.duties).open_for_driver(&driver_id).map(|d| d.id);
        let Some(id) = open else {
            return Err(EngineError::DriverNotAssigned(driver_id));
        };

        let event = Event::DutyReleased {
            id,
            driver_id,
            actor: Some(actor.id),
            at: self.now(),
        };
        self.persist(&event).await?;
        info!("driver {driver_id} released from duty {id}");
        lock(&self.duties)
            .history(&driver_id)
            .into_iter()
            .find(|d| d.id == id)
            .ok_or(EngineError::NotFound("duty assignment", id))
    }

    pub fn active_duty(&self, driver_id: &Ulid) -> Option<DutyAssignment> {
        lock(&self.duties).open_for_driver(driver_id).cloned()
    }

    pub fn duty_history(&self, driver_id: &Ulid) -> Result<Vec<DutyAssignment>, EngineError> {
        self.directory
            .driver(driver_id)
            .ok_or(EngineError::NotFound("driver", *driver_id))?;
        Ok(lock(&self.duties).history(driver_id))
    }

    /// Open duty on any vehicle registered against this resource.
    pub(super) fn resource_has_open_duty(&self, resource_id: &Ulid) -> bool {
        let vehicles = self.directory.vehicles_on_resource(resource_id);
        let roster = lock(&self.duties);
        vehicles.iter().any(|v| roster.open_for_vehicle(&v.id).is_some())
    }
}
