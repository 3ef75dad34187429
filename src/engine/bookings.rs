use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::lifecycle::{Authority, Lane, Transition};
use super::{Engine, EngineError};

/// A member's booking request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
}

/// Trim a note; blank notes count as absent.
pub(super) fn clean_note(note: Option<String>, required: bool) -> Result<Option<String>, EngineError> {
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if required && note.is_none() {
        return Err(EngineError::NoteRequired);
    }
    if note.as_ref().is_some_and(|n| n.len() > MAX_NOTE_LEN) {
        return Err(EngineError::LimitExceeded("note too long"));
    }
    Ok(note)
}

pub(super) fn clean_purpose(purpose: &str) -> Result<String, EngineError> {
    let purpose = purpose.trim();
    if purpose.is_empty() {
        return Err(EngineError::InvalidInput("purpose is required".into()));
    }
    if purpose.len() > MAX_PURPOSE_LEN {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(purpose.to_string())
}

impl Engine {
    /// Shared creation path for both lanes. The resource lock is held from
    /// the availability check until the booking is applied, so two
    /// overlapping requests can never both pass the conflict check.
    pub(super) async fn request_booking(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        purpose: String,
        party: Party,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.lock_resource(resource_id).await?;
        if guard.status != ResourceStatus::Available {
            return Err(EngineError::ResourceUnavailable(resource_id));
        }
        let span = validate_span(start, end)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        check_no_conflict(&guard, &span, None)?;

        let id = Ulid::new();
        let label = party.label();
        let event = Event::BookingRequested {
            id,
            resource_id,
            span,
            purpose,
            party,
            at: self.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL, "party" => label)
            .increment(1);
        info!("{label} booking {id} requested on {} [{}, {})", guard.name, span.start, span.end);

        guard
            .booking(&id)
            .cloned()
            .ok_or(EngineError::NotFound("booking", id))
    }

    pub async fn create_booking(&self, actor: &Actor, req: NewBooking) -> Result<Booking, EngineError> {
        let purpose = clean_purpose(&req.purpose)?;
        self.request_booking(
            req.resource_id,
            req.start,
            req.end,
            purpose,
            Party::Member { user_id: actor.id },
        )
        .await
    }

    pub async fn cancel_booking(&self, booking_id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        self.transition(booking_id, Lane::Member, Transition::Cancel, Authority::Member(actor), None)
            .await
    }

    pub async fn approve_booking(
        &self,
        booking_id: Ulid,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let note = clean_note(note, false)?;
        self.transition(booking_id, Lane::Member, Transition::Approve, Authority::Member(actor), note)
            .await
    }

    pub async fn reject_booking(
        &self,
        booking_id: Ulid,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let note = clean_note(note, true)?;
        self.transition(booking_id, Lane::Member, Transition::Reject, Authority::Member(actor), note)
            .await
    }

    pub async fn start_booking(&self, booking_id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        self.transition(booking_id, Lane::Member, Transition::Start, Authority::Member(actor), None)
            .await
    }

    pub async fn complete_booking(&self, booking_id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        self.transition(booking_id, Lane::Member, Transition::Complete, Authority::Member(actor), None)
            .await
    }

    /// One rating per completed vehicle trip, by the booking's owner.
    pub async fn rate_driver(
        &self,
        booking_id: Ulid,
        actor: &Actor,
        rating: u8,
        review: Option<String>,
    ) -> Result<DriverRating, EngineError> {
        if !(1..=5).contains(&rating) {
            return Err(EngineError::InvalidRating(rating));
        }
        let review = clean_note(review, false)?;

        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .filter(|b| !b.party.is_guest())
            .ok_or(EngineError::NotFound("booking", booking_id))?;
        if booking.status != BookingStatus::Completed {
            return Err(EngineError::forbidden(
                "you can only rate a driver for completed bookings",
            ));
        }
        if !booking.is_owned_by(actor.id) {
            return Err(EngineError::forbidden("you can only rate for your own bookings"));
        }
        if guard.kind != ResourceKind::Vehicle {
            return Err(EngineError::forbidden("driver rating is only for vehicle bookings"));
        }
        let Some(trip) = booking.trip else {
            return Err(EngineError::forbidden("no driver was assigned to this booking"));
        };
        if booking.rating.is_some() {
            return Err(EngineError::forbidden("you have already rated this booking"));
        }

        let rating = DriverRating {
            id: Ulid::new(),
            booking_id,
            driver_id: trip.driver_id,
            rated_by: actor.id,
            rating,
            review,
            at: self.now(),
        };
        let event = Event::DriverRated {
            resource_id: guard.id,
            rating: rating.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("driver {} rated {}/5 for booking {booking_id}", rating.driver_id, rating.rating);
        Ok(rating)
    }

    /// Move every member booking still APPROVED after its window closed to
    /// OVERDUE. Returns how many moved; a second run right after is a no-op.
    pub async fn mark_overdue(&self) -> Result<usize, EngineError> {
        let now = self.now();
        let resource_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        let mut count = 0;
        for resource_id in resource_ids {
            // Deleted since we listed it.
            let Ok(mut guard) = self.lock_resource(resource_id).await else {
                continue;
            };
            let due: Vec<Ulid> = guard
                .bookings
                .iter()
                .filter(|b| {
                    b.status == BookingStatus::Approved && !b.party.is_guest() && b.span.end < now
                })
                .map(|b| b.id)
                .collect();
            for id in due {
                self.transition_locked(
                    &mut guard,
                    id,
                    Lane::Member,
                    Transition::MarkOverdue,
                    Authority::System,
                    None,
                )
                .await?;
                info!("booking {id} auto-marked OVERDUE");
                count += 1;
            }
        }
        if count > 0 {
            metrics::counter!(crate::observability::OVERDUE_SWEPT_TOTAL).increment(count as u64);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_notes_are_absent() {
        assert_eq!(clean_note(Some("   ".into()), false).unwrap(), None);
        assert!(matches!(clean_note(Some(" \t".into()), true), Err(EngineError::NoteRequired)));
        assert!(matches!(clean_note(None, true), Err(EngineError::NoteRequired)));
        assert_eq!(clean_note(Some(" ok ".into()), true).unwrap(), Some("ok".into()));
    }

    #[test]
    fn purpose_is_required() {
        assert!(matches!(clean_purpose("  "), Err(EngineError::InvalidInput(_))));
        assert_eq!(clean_purpose(" Team sync ").unwrap(), "Team sync");
    }
}
