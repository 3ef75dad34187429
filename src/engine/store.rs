use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// Users, drivers, vehicles and driver ratings. Writes arrive only through
/// `apply_event`; uniqueness checks are serialised by the engine's
/// directory lock.
pub struct Directory {
    users: DashMap<Ulid, User>,
    emails: DashMap<String, Ulid>,
    drivers: DashMap<Ulid, Driver>,
    driver_by_user: DashMap<Ulid, Ulid>,
    vehicles: DashMap<Ulid, Vehicle>,
    plates: DashMap<String, Ulid>,
    ratings: DashMap<Ulid, Vec<DriverRating>>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

pub(super) fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub(super) fn plate_key(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

impl Directory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            drivers: DashMap::new(),
            driver_by_user: DashMap::new(),
            vehicles: DashMap::new(),
            plates: DashMap::new(),
            ratings: DashMap::new(),
        }
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn email_taken(&self, email: &str) -> bool {
        self.emails.contains_key(&email_key(email))
    }

    pub fn has_admin(&self) -> bool {
        self.users.iter().any(|u| u.role == Role::Admin && u.active)
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    // ── Drivers ──────────────────────────────────────────────

    pub fn driver(&self, id: &Ulid) -> Option<Driver> {
        self.drivers.get(id).map(|e| e.value().clone())
    }

    pub fn driver_for_user(&self, user_id: &Ulid) -> Option<Driver> {
        let driver_id = *self.driver_by_user.get(user_id)?.value();
        self.driver(&driver_id)
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers.iter().map(|e| e.value().clone()).collect()
    }

    // ── Vehicles ─────────────────────────────────────────────

    pub fn vehicle(&self, id: &Ulid) -> Option<Vehicle> {
        self.vehicles.get(id).map(|e| e.value().clone())
    }

    pub fn plate_taken(&self, plate: &str) -> bool {
        self.plates.contains_key(&plate_key(plate))
    }

    pub fn vehicles_on_resource(&self, resource_id: &Ulid) -> Vec<Vehicle> {
        self.vehicles
            .iter()
            .filter(|v| v.resource_id == *resource_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.vehicles.iter().map(|e| e.value().clone()).collect()
    }

    // ── Ratings ──────────────────────────────────────────────

    pub fn ratings_for(&self, driver_id: &Ulid) -> Vec<DriverRating> {
        self.ratings
            .get(driver_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Drop ratings that belonged to cascade-deleted bookings.
    pub fn forget_ratings(&self, booking_ids: &[Ulid]) {
        if booking_ids.is_empty() {
            return;
        }
        for mut entry in self.ratings.iter_mut() {
            entry.value_mut().retain(|r| !booking_ids.contains(&r.booking_id));
        }
    }

    fn insert_user(&self, user: &User) {
        self.emails.insert(email_key(&user.email), user.id);
        self.users.insert(user.id, user.clone());
    }

    fn insert_driver(&self, driver: &Driver) {
        self.driver_by_user.insert(driver.user_id, driver.id);
        self.drivers.insert(driver.id, driver.clone());
    }

    fn insert_vehicle(&self, vehicle: &Vehicle) {
        self.plates.insert(plate_key(&vehicle.plate_number), vehicle.id);
        self.vehicles.insert(vehicle.id, vehicle.clone());
    }

    fn insert_rating(&self, rating: &DriverRating) {
        self.ratings
            .entry(rating.driver_id)
            .or_default()
            .push(rating.clone());
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { user, .. } | Event::UserRestored { user } => {
                self.insert_user(user)
            }
            Event::UserActiveSet { id, active, .. } => {
                if let Some(mut user) = self.users.get_mut(id) {
                    user.active = *active;
                }
            }
            Event::DriverRegistered { driver, .. } | Event::DriverRestored { driver } => {
                self.insert_driver(driver)
            }
            Event::DriverActiveSet { id, active, .. } => {
                if let Some(mut driver) = self.drivers.get_mut(id) {
                    driver.active = *active;
                }
            }
            Event::VehicleRegistered { vehicle, .. } | Event::VehicleRestored { vehicle } => {
                self.insert_vehicle(vehicle)
            }
            Event::DriverRated { rating, .. } => self.insert_rating(rating),
            Event::BookingRestored { booking } => {
                if let Some(rating) = &booking.rating {
                    self.insert_rating(rating);
                }
            }
            Event::ResourceDeleted { id, .. } => {
                self.vehicles.retain(|_, v| v.resource_id != *id);
                self.plates
                    .retain(|_, vehicle_id| self.vehicles.contains_key(vehicle_id));
            }
            _ => {}
        }
    }
}
