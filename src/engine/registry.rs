use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::{email_key, plate_key};
use super::{Engine, EngineError};

fn require_admin(actor: &Actor, what: &str) -> Result<(), EngineError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::forbidden(format!("only an admin can {what}")))
    }
}

fn clean_field(value: &str, field: &str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} is required")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("field too long"));
    }
    Ok(value.to_string())
}

impl Engine {
    // ── Resources ────────────────────────────────────────────

    pub async fn create_resource(
        &self,
        actor: &Actor,
        name: &str,
        kind: ResourceKind,
    ) -> Result<ResourceInfo, EngineError> {
        require_admin(actor, "create resources")?;
        if self.state.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        let name = clean_field(name, "name")?;

        let id = Ulid::new();
        let at = self.now();
        let event = Event::ResourceCreated {
            id,
            name: name.clone(),
            kind,
            actor: Some(actor.id),
            at,
        };
        self.wal_append(&event).await?;
        let rs = ResourceState::new(id, name, kind, at);
        let info = rs.info();
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        self.apply_event(None, &event);
        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(self.state.len() as f64);
        info!("created {kind:?} resource {id} ({})", info.name);
        Ok(info)
    }

    pub async fn get_resource_info(&self, id: &Ulid) -> Result<ResourceInfo, EngineError> {
        let rs = self
            .get_resource(id)
            .ok_or(EngineError::NotFound("resource", *id))?;
        let guard = rs.read().await;
        Ok(guard.info())
    }

    /// Optionally narrowed to one kind; sorted by name.
    pub async fn list_resources(&self, kind: Option<ResourceKind>) -> Vec<ResourceInfo> {
        let all: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(all.len());
        for rs in all {
            let guard = rs.read().await;
            if kind.is_none_or(|k| k == guard.kind) {
                out.push(guard.info());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Admin status override. Existing bookings are left as they are.
    pub async fn set_resource_status(
        &self,
        id: Ulid,
        status: ResourceStatus,
        actor: &Actor,
    ) -> Result<ResourceInfo, EngineError> {
        require_admin(actor, "change resource status")?;
        self.change_status(id, status, None, actor).await
    }

    pub async fn begin_maintenance(&self, id: Ulid, actor: &Actor) -> Result<ResourceInfo, EngineError> {
        require_admin(actor, "manage maintenance")?;
        self.change_status(id, ResourceStatus::Maintenance, Some(ResourceStatus::Available), actor)
            .await
    }

    pub async fn end_maintenance(&self, id: Ulid, actor: &Actor) -> Result<ResourceInfo, EngineError> {
        require_admin(actor, "manage maintenance")?;
        self.change_status(id, ResourceStatus::Available, Some(ResourceStatus::Maintenance), actor)
            .await
    }

    async fn change_status(
        &self,
        id: Ulid,
        status: ResourceStatus,
        expect: Option<ResourceStatus>,
        actor: &Actor,
    ) -> Result<ResourceInfo, EngineError> {
        let mut guard = self.lock_resource(id).await?;
        if let Some(expected) = expect
            && guard.status != expected
        {
            return Err(EngineError::forbidden(format!(
                "resource is {:?}, expected {expected:?}",
                guard.status
            )));
        }
        if guard.status == status {
            return Ok(guard.info());
        }
        let event = Event::ResourceStatusChanged {
            id,
            status,
            actor: Some(actor.id),
            at: self.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("resource {id} status -> {status:?}");
        Ok(guard.info())
    }

    /// Physically remove a resource with all of its bookings, their trips
    /// and ratings, and the vehicle records registered against it.
    pub async fn delete_resource(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        require_admin(actor, "delete resources")?;
        let guard = self.lock_resource(id).await?;
        let _duty = self.duty_lock.lock().await;
        if self.resource_has_open_duty(&id) {
            return Err(EngineError::forbidden(
                "a vehicle of this resource is on duty; release the driver first",
            ));
        }
        let _directory = self.directory_lock.lock().await;

        let event = Event::ResourceDeleted {
            id,
            actor: Some(actor.id),
            at: self.now(),
        };
        self.wal_append(&event).await?;
        self.purge_resource(&guard);
        self.apply_event(None, &event);
        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(self.state.len() as f64);
        info!(
            "deleted resource {id} ({}) with {} bookings",
            guard.name,
            guard.bookings.len()
        );
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────

    /// Register the first admin when the directory has none. Returns the
    /// new user, or `None` when an admin already exists.
    pub async fn bootstrap_admin(&self, name: &str, email: &str) -> Result<Option<User>, EngineError> {
        let _directory = self.directory_lock.lock().await;
        if self.directory.has_admin() {
            return Ok(None);
        }
        let user = self.insert_user(None, name, email, Role::Admin).await?;
        info!("bootstrapped admin {} <{}>", user.name, user.email);
        Ok(Some(user))
    }

    pub async fn register_user(
        &self,
        actor: &Actor,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<User, EngineError> {
        require_admin(actor, "register users")?;
        let _directory = self.directory_lock.lock().await;
        let user = self.insert_user(Some(actor.id), name, email, role).await?;
        info!("registered user {} as {role:?}", user.id);
        Ok(user)
    }

    /// Caller holds the directory lock.
    async fn insert_user(
        &self,
        actor: Option<Ulid>,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<User, EngineError> {
        let name = clean_field(name, "name")?;
        let email = clean_field(email, "email")?;
        if !email.contains('@') {
            return Err(EngineError::InvalidInput("email is not valid".into()));
        }
        if self.directory.email_taken(&email) {
            return Err(EngineError::AlreadyExists(format!("user with email {}", email_key(&email))));
        }
        let user = User {
            id: Ulid::new(),
            name,
            email,
            role,
            active: true,
        };
        let event = Event::UserRegistered {
            user: user.clone(),
            actor,
            at: self.now(),
        };
        self.persist(&event).await?;
        Ok(user)
    }

    pub fn get_user(&self, id: &Ulid) -> Result<User, EngineError> {
        self.directory.user(id).ok_or(EngineError::NotFound("user", *id))
    }

    pub async fn set_user_active(&self, actor: &Actor, id: Ulid, active: bool) -> Result<User, EngineError> {
        require_admin(actor, "activate or deactivate users")?;
        if actor.id == id && !active {
            return Err(EngineError::forbidden("you cannot deactivate yourself"));
        }
        let _directory = self.directory_lock.lock().await;
        let user = self.get_user(&id)?;
        if user.active != active {
            let event = Event::UserActiveSet {
                id,
                active,
                actor: Some(actor.id),
                at: self.now(),
            };
            self.persist(&event).await?;
            info!("user {id} active = {active}");
        }
        self.get_user(&id)
    }

    // ── Drivers ──────────────────────────────────────────────

    pub async fn register_driver(
        &self,
        actor: &Actor,
        user_id: Ulid,
        license_number: &str,
        phone: &str,
    ) -> Result<Driver, EngineError> {
        require_admin(actor, "register drivers")?;
        let license_number = clean_field(license_number, "license number")?;
        let phone = clean_field(phone, "phone")?;
        let _directory = self.directory_lock.lock().await;
        let user = self.get_user(&user_id)?;
        if user.role != Role::Driver {
            return Err(EngineError::forbidden("user does not have the DRIVER role"));
        }
        if self.directory.driver_for_user(&user_id).is_some() {
            return Err(EngineError::AlreadyExists(format!("driver profile for user {user_id}")));
        }
        let driver = Driver {
            id: Ulid::new(),
            user_id,
            license_number,
            phone,
            active: true,
        };
        let event = Event::DriverRegistered {
            driver: driver.clone(),
            actor: Some(actor.id),
            at: self.now(),
        };
        self.persist(&event).await?;
        info!("registered driver {} for user {user_id}", driver.id);
        Ok(driver)
    }

    pub async fn set_driver_active(
        &self,
        actor: &Actor,
        driver_id: Ulid,
        active: bool,
    ) -> Result<Driver, EngineError> {
        require_admin(actor, "activate or deactivate drivers")?;
        let _directory = self.directory_lock.lock().await;
        let driver = self
            .directory
            .driver(&driver_id)
            .ok_or(EngineError::NotFound("driver", driver_id))?;
        if driver.active != active {
            let event = Event::DriverActiveSet {
                id: driver_id,
                active,
                actor: Some(actor.id),
                at: self.now(),
            };
            self.persist(&event).await?;
            info!("driver {driver_id} active = {active}");
        }
        self.directory
            .driver(&driver_id)
            .ok_or(EngineError::NotFound("driver", driver_id))
    }

    // ── Vehicles ─────────────────────────────────────────────

    pub async fn register_vehicle(
        &self,
        actor: &Actor,
        resource_id: Ulid,
        plate_number: &str,
        brand: &str,
        model: &str,
    ) -> Result<Vehicle, EngineError> {
        require_admin(actor, "register vehicles")?;
        let plate_number = clean_field(plate_number, "plate number")?;
        let brand = clean_field(brand, "brand")?;
        let model = clean_field(model, "model")?;

        // Read the kind and let the resource lock go before the directory
        // lock; a delete in between is caught by the re-check below.
        let kind = self.get_resource_info(&resource_id).await?.kind;
        if kind != ResourceKind::Vehicle {
            return Err(EngineError::InvalidInput(
                "vehicles can only be registered against a VEHICLE resource".into(),
            ));
        }
        let _directory = self.directory_lock.lock().await;
        if !self.state.contains_key(&resource_id) {
            return Err(EngineError::NotFound("resource", resource_id));
        }
        if self.directory.plate_taken(&plate_number) {
            return Err(EngineError::AlreadyExists(format!(
                "vehicle with plate {}",
                plate_key(&plate_number)
            )));
        }
        let vehicle = Vehicle {
            id: Ulid::new(),
            resource_id,
            plate_number,
            brand,
            model,
        };
        let event = Event::VehicleRegistered {
            vehicle: vehicle.clone(),
            actor: Some(actor.id),
            at: self.now(),
        };
        self.persist(&event).await?;
        info!("registered vehicle {} on resource {resource_id}", vehicle.plate_number);
        Ok(vehicle)
    }
}
