use std::collections::VecDeque;

use crate::limits::MAX_AUDIT_ENTRIES;
use crate::model::*;

/// Bounded, append-only window of the most recent audit entries.
#[derive(Default)]
pub(super) struct AuditLog {
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn push(&mut self, entry: AuditEntry) {
        if self.entries.len() == MAX_AUDIT_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }
}

fn entry(
    actor: Option<ulid::Ulid>,
    action: &str,
    entity: &str,
    entity_id: ulid::Ulid,
    description: String,
    at: Ms,
) -> AuditEntry {
    AuditEntry {
        actor,
        action: action.into(),
        entity: entity.into(),
        entity_id,
        description,
        at,
    }
}

fn booking_entity(rs: Option<&ResourceState>, id: &ulid::Ulid) -> &'static str {
    match rs.and_then(|rs| rs.booking(id)) {
        Some(b) if b.party.is_guest() => "GuestBooking",
        _ => "Booking",
    }
}

/// Derive the audit entry that an event writes. `rs` is the owning
/// resource after the event was applied, when there is one.
pub(super) fn entry_for(event: &Event, rs: Option<&ResourceState>) -> Option<AuditEntry> {
    let e = match event {
        Event::ResourceCreated { id, name, kind, actor, at } => entry(
            *actor,
            "CREATE",
            "Resource",
            *id,
            format!("created {kind:?} resource {name}"),
            *at,
        ),
        Event::ResourceStatusChanged { id, status, actor, at } => entry(
            *actor,
            "UPDATE_STATUS",
            "Resource",
            *id,
            format!("resource status set to {status:?}"),
            *at,
        ),
        Event::ResourceDeleted { id, actor, at } => {
            entry(*actor, "DELETE", "Resource", *id, "resource deleted with its bookings".into(), *at)
        }
        Event::UserRegistered { user, actor, at } => entry(
            *actor,
            "CREATE",
            "User",
            user.id,
            format!("registered {} as {:?}", user.name, user.role),
            *at,
        ),
        Event::UserActiveSet { id, active, actor, at } => entry(
            *actor,
            if *active { "ACTIVATE" } else { "DEACTIVATE" },
            "User",
            *id,
            format!("user active = {active}"),
            *at,
        ),
        Event::DriverRegistered { driver, actor, at } => entry(
            *actor,
            "CREATE",
            "Driver",
            driver.id,
            format!("driver registered with license {}", driver.license_number),
            *at,
        ),
        Event::DriverActiveSet { id, active, actor, at } => entry(
            *actor,
            if *active { "ACTIVATE" } else { "DEACTIVATE" },
            "Driver",
            *id,
            format!("driver active = {active}"),
            *at,
        ),
        Event::VehicleRegistered { vehicle, actor, at } => entry(
            *actor,
            "CREATE",
            "Vehicle",
            vehicle.id,
            format!("vehicle {} registered", vehicle.plate_number),
            *at,
        ),
        Event::DutyAssigned { id, driver_id, vehicle_id, actor, at } => entry(
            *actor,
            "ASSIGN",
            "DriverAssignment",
            *id,
            format!("driver {driver_id} on duty with vehicle {vehicle_id}"),
            *at,
        ),
        Event::DutyReleased { id, driver_id, actor, at } => entry(
            *actor,
            "RELEASE",
            "DriverAssignment",
            *id,
            format!("driver {driver_id} released from duty"),
            *at,
        ),
        Event::BookingRequested { id, span, party, at, .. } => entry(
            party.member_id(),
            "CREATE",
            if party.is_guest() { "GuestBooking" } else { "Booking" },
            *id,
            format!(
                "{} booking requested for [{}, {}) on {}",
                party.label(),
                span.start,
                span.end,
                rs.map_or("unknown resource", |rs| rs.name.as_str())
            ),
            *at,
        ),
        Event::BookingStatusChanged { id, from, to, actor, note, at, .. } => {
            let action = match to {
                BookingStatus::Approved => "APPROVE",
                BookingStatus::Rejected => "REJECT",
                BookingStatus::Cancelled => "CANCEL",
                BookingStatus::Ongoing => "START",
                BookingStatus::Completed => "COMPLETE",
                BookingStatus::Overdue => "SYSTEM_OVERDUE",
                BookingStatus::Pending => "UPDATE",
            };
            let mut description = format!("booking {from} -> {to}");
            if let Some(note) = note {
                description.push_str(": ");
                description.push_str(note);
            }
            entry(*actor, action, booking_entity(rs, id), *id, description, *at)
        }
        Event::TripAssigned { id, trip, actor, .. } => entry(
            *actor,
            "ASSIGN",
            "Booking",
            *id,
            format!("driver {} and vehicle {} assigned", trip.driver_id, trip.vehicle_id),
            trip.assigned_at,
        ),
        Event::DriverRated { rating, .. } => entry(
            Some(rating.rated_by),
            "RATE",
            "DriverRating",
            rating.id,
            format!("driver {} rated {}/5", rating.driver_id, rating.rating),
            rating.at,
        ),
        Event::ResourceRestored { .. }
        | Event::UserRestored { .. }
        | Event::DriverRestored { .. }
        | Event::VehicleRestored { .. }
        | Event::BookingRestored { .. }
        | Event::DutyRestored { .. }
        | Event::AuditRestored { .. } => return None,
    };
    Some(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn window_is_bounded_and_newest_first() {
        let mut log = AuditLog::default();
        for i in 0..(MAX_AUDIT_ENTRIES + 3) {
            log.push(entry(None, "X", "Booking", Ulid::new(), String::new(), i as Ms));
        }
        assert_eq!(log.snapshot().len(), MAX_AUDIT_ENTRIES);
        let recent = log.recent(2);
        assert_eq!(recent[0].at, (MAX_AUDIT_ENTRIES + 2) as Ms);
        assert_eq!(recent[1].at, (MAX_AUDIT_ENTRIES + 1) as Ms);
    }

    #[test]
    fn overdue_sweep_is_system_attributed() {
        let event = Event::BookingStatusChanged {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            from: BookingStatus::Approved,
            to: BookingStatus::Overdue,
            actor: None,
            note: None,
            at: 9,
        };
        let e = entry_for(&event, None).unwrap();
        assert_eq!(e.actor, None);
        assert_eq!(e.action, "SYSTEM_OVERDUE");
    }

    #[test]
    fn restored_records_are_not_audited() {
        let event = Event::UserRestored {
            user: User {
                id: Ulid::new(),
                name: "a".into(),
                email: "a@b.c".into(),
                role: Role::Admin,
                active: true,
            },
        };
        assert!(entry_for(&event, None).is_none());
    }
}
