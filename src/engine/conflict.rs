use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Check a requested window: ordering first, then sane bounds.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let span = Span::checked(start, end).ok_or(EngineError::InvalidDateRange)?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

/// First active booking (member or guest) overlapping `span`, ignoring
/// `exclude`. Pure read over the caller's locked view.
pub(crate) fn find_conflict(rs: &ResourceState, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    rs.overlapping(span)
        .filter(|b| b.status.is_active())
        .find(|b| Some(b.id) != exclude)
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, span, exclude) {
        Some(id) => {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            Err(EngineError::BookingConflict(id))
        }
        None => Ok(()),
    }
}

impl Engine {
    /// Whether any active booking on the resource overlaps `[start, end)`.
    pub async fn has_conflict(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = Span::checked(start, end).ok_or(EngineError::InvalidDateRange)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound("resource", resource_id))?;
        let guard = rs.read().await;
        Ok(find_conflict(&guard, &span, exclude).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Ms = 1_748_768_400_000; // 2025-06-01T09:00Z
    const HOUR: Ms = 3_600_000;

    fn booking(rs: &ResourceState, start: Ms, end: Ms, status: BookingStatus, guest: bool) -> Booking {
        let party = if guest {
            Party::Guest {
                contact: GuestContact {
                    name: "g".into(),
                    email: "g@example.com".into(),
                    phone: "1".into(),
                    department: "d".into(),
                },
                token_digest: "d".into(),
            }
        } else {
            Party::Member { user_id: Ulid::new() }
        };
        Booking {
            id: Ulid::new(),
            resource_id: rs.id,
            span: Span::new(start, end),
            purpose: "p".into(),
            status,
            party,
            approval: None,
            rejection_note: None,
            trip: None,
            returned_at: None,
            approval_log: Vec::new(),
            rating: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn room() -> ResourceState {
        ResourceState::new(Ulid::new(), "Room 5".into(), ResourceKind::Room, 0)
    }

    #[test]
    fn validate_span_orders_before_bounds() {
        assert!(matches!(validate_span(T, T), Err(EngineError::InvalidDateRange)));
        assert!(matches!(validate_span(T + 1, T), Err(EngineError::InvalidDateRange)));
        assert!(matches!(
            validate_span(0, 10),
            Err(EngineError::LimitExceeded("timestamp out of range"))
        ));
        assert!(matches!(
            validate_span(T, T + MAX_SPAN_DURATION_MS + 1),
            Err(EngineError::LimitExceeded("span too wide"))
        ));
        assert_eq!(validate_span(T, T + HOUR).unwrap(), Span::new(T, T + HOUR));
    }

    #[test]
    fn inactive_statuses_never_conflict() {
        let mut rs = room();
        for status in [
            BookingStatus::Rejected,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
            BookingStatus::Overdue,
        ] {
            let b = booking(&rs, T, T + HOUR, status, false);
            rs.insert_booking(b);
        }
        assert_eq!(find_conflict(&rs, &Span::new(T, T + HOUR), None), None);
    }

    #[test]
    fn guest_and_member_bookings_block_each_other() {
        let mut rs = room();
        let g = booking(&rs, T, T + HOUR, BookingStatus::Pending, true);
        let gid = g.id;
        rs.insert_booking(g);
        assert_eq!(find_conflict(&rs, &Span::new(T + HOUR / 2, T + 2 * HOUR), None), Some(gid));
    }

    #[test]
    fn touching_boundaries_do_not_conflict() {
        let mut rs = room();
        let b = booking(&rs, T, T + HOUR, BookingStatus::Approved, false);
        rs.insert_booking(b);
        assert!(check_no_conflict(&rs, &Span::new(T + HOUR, T + 2 * HOUR), None).is_ok());
        assert!(check_no_conflict(&rs, &Span::new(T - HOUR, T), None).is_ok());
    }

    #[test]
    fn exclude_ignores_self() {
        let mut rs = room();
        let b = booking(&rs, T, T + HOUR, BookingStatus::Pending, false);
        let id = b.id;
        rs.insert_booking(b);
        assert!(check_no_conflict(&rs, &Span::new(T, T + HOUR), Some(id)).is_ok());
        assert!(matches!(
            check_no_conflict(&rs, &Span::new(T, T + HOUR), None),
            Err(EngineError::BookingConflict(c)) if c == id
        ));
    }
}
