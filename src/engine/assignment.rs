use std::collections::HashMap;

use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy)]
struct TripSlot {
    booking_id: Ulid,
    span: Span,
}

/// Which bookings hold which physical vehicle and driver, and when.
///
/// Slots are never pruned on status change; `clash` asks the caller whether
/// a slot's booking still holds its trip. Statuses only move forward, so a
/// stale answer can over-report a clash but never miss one.
#[derive(Default)]
pub(super) struct TripBoard {
    by_vehicle: HashMap<Ulid, Vec<TripSlot>>,
    by_driver: HashMap<Ulid, Vec<TripSlot>>,
    placed: HashMap<Ulid, Trip>,
}

impl TripBoard {
    /// Record a booking's trip, replacing any earlier assignment.
    pub fn place(&mut self, booking_id: Ulid, trip: &Trip, span: Span) {
        self.remove(booking_id);
        let slot = TripSlot { booking_id, span };
        self.by_vehicle.entry(trip.vehicle_id).or_default().push(slot);
        self.by_driver.entry(trip.driver_id).or_default().push(slot);
        self.placed.insert(booking_id, *trip);
    }

    fn remove(&mut self, booking_id: Ulid) {
        let Some(old) = self.placed.remove(&booking_id) else {
            return;
        };
        if let Some(slots) = self.by_vehicle.get_mut(&old.vehicle_id) {
            slots.retain(|s| s.booking_id != booking_id);
        }
        if let Some(slots) = self.by_driver.get_mut(&old.driver_id) {
            slots.retain(|s| s.booking_id != booking_id);
        }
    }

    pub fn forget(&mut self, booking_ids: &[Ulid]) {
        for id in booking_ids {
            self.remove(*id);
        }
    }

    /// First other booking that holds the vehicle or the driver during
    /// `span`, with which of the two it holds.
    pub fn clash(
        &self,
        booking_id: Ulid,
        trip: &Trip,
        span: &Span,
        holds: impl Fn(&Ulid) -> bool,
    ) -> Option<(Ulid, &'static str)> {
        let first = |slots: Option<&Vec<TripSlot>>| {
            slots
                .into_iter()
                .flatten()
                .find(|s| s.booking_id != booking_id && s.span.overlaps(span) && holds(&s.booking_id))
                .map(|s| s.booking_id)
        };
        first(self.by_vehicle.get(&trip.vehicle_id))
            .map(|id| (id, "vehicle"))
            .or_else(|| first(self.by_driver.get(&trip.driver_id)).map(|id| (id, "driver")))
    }
}

impl Engine {
    /// Attach a driver and vehicle to an approved vehicle booking for its
    /// window. Neither may be on another approved or ongoing trip that
    /// overlaps it.
    pub async fn assign_trip(
        &self,
        booking_id: Ulid,
        actor: &Actor,
        driver_id: Ulid,
        vehicle_id: Ulid,
    ) -> Result<Booking, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can assign trips"));
        }
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .filter(|b| !b.party.is_guest())
            .cloned()
            .ok_or(EngineError::NotFound("booking", booking_id))?;
        if booking.status != BookingStatus::Approved {
            return Err(EngineError::forbidden(
                "only APPROVED bookings can have a vehicle and driver assigned",
            ));
        }
        if guard.kind != ResourceKind::Vehicle {
            return Err(EngineError::forbidden("assignment only applies to vehicle bookings"));
        }
        self.directory
            .driver(&driver_id)
            .filter(|d| d.active)
            .ok_or(EngineError::NotFound("active driver", driver_id))?;
        let vehicle = self
            .directory
            .vehicle(&vehicle_id)
            .ok_or(EngineError::NotFound("vehicle", vehicle_id))?;

        let trip = Trip {
            driver_id,
            vehicle_id,
            assigned_at: self.now(),
        };

        // Resource lock is already held; trip lock always comes second.
        let _trips = self.trip_lock.lock().await;
        let clash = super::lock(&self.trips).clash(booking_id, &trip, &booking.span, |id| {
            self.bookings.get(id).is_some_and(|r| r.status.holds_trip())
        });
        if let Some((other, what)) = clash {
            info!("trip for booking {booking_id} rejected: {what} already on booking {other}");
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::BookingConflict(other));
        }

        let event = Event::TripAssigned {
            id: booking_id,
            resource_id: guard.id,
            trip,
            actor: Some(actor.id),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::TRIPS_ASSIGNED_TOTAL).increment(1);
        info!(
            "driver {driver_id} and vehicle {} assigned to booking {booking_id}",
            vehicle.plate_number
        );

        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound("booking", booking_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(driver_id: Ulid, vehicle_id: Ulid) -> Trip {
        Trip {
            driver_id,
            vehicle_id,
            assigned_at: 0,
        }
    }

    #[test]
    fn clash_on_vehicle_or_driver() {
        let mut board = TripBoard::default();
        let (d1, d2, v1, v2) = (Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new());
        let b1 = Ulid::new();
        board.place(b1, &trip(d1, v1), Span::new(100, 200));

        let b2 = Ulid::new();
        let all_hold = |_: &Ulid| true;
        assert_eq!(
            board.clash(b2, &trip(d2, v1), &Span::new(150, 250), all_hold),
            Some((b1, "vehicle"))
        );
        assert_eq!(
            board.clash(b2, &trip(d1, v2), &Span::new(150, 250), all_hold),
            Some((b1, "driver"))
        );
        assert_eq!(board.clash(b2, &trip(d2, v2), &Span::new(150, 250), all_hold), None);
        // Adjacent windows share the vehicle fine.
        assert_eq!(board.clash(b2, &trip(d1, v1), &Span::new(200, 300), all_hold), None);
    }

    #[test]
    fn finished_trips_release_their_slot() {
        let mut board = TripBoard::default();
        let (d, v, b1) = (Ulid::new(), Ulid::new(), Ulid::new());
        board.place(b1, &trip(d, v), Span::new(100, 200));
        assert_eq!(board.clash(Ulid::new(), &trip(d, v), &Span::new(100, 200), |_| false), None);
    }

    #[test]
    fn reassignment_replaces_previous_trip() {
        let mut board = TripBoard::default();
        let (d1, d2, v1, v2, b1) = (Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new());
        board.place(b1, &trip(d1, v1), Span::new(100, 200));
        board.place(b1, &trip(d2, v2), Span::new(100, 200));

        let other = Ulid::new();
        assert_eq!(board.clash(other, &trip(d1, v1), &Span::new(100, 200), |_| true), None);
        assert!(board.clash(other, &trip(d2, v1), &Span::new(100, 200), |_| true).is_some());
    }

    #[test]
    fn a_booking_never_clashes_with_itself() {
        let mut board = TripBoard::default();
        let (d, v, b1) = (Ulid::new(), Ulid::new(), Ulid::new());
        board.place(b1, &trip(d, v), Span::new(100, 200));
        assert_eq!(board.clash(b1, &trip(d, v), &Span::new(100, 200), |_| true), None);
    }
}
