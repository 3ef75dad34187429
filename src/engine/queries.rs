use ulid::Ulid;

use crate::model::*;

use super::{lock, Engine, EngineError};

/// Narrowing for `list_bookings`. Every field is optional; `from`/`to`
/// keep bookings whose window overlaps `[from, to)`.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub resource_id: Option<Ulid>,
    pub kind: Option<ResourceKind>,
    pub owner: Option<Ulid>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

impl BookingFilter {
    fn admits(&self, b: &Booking, kind: ResourceKind) -> bool {
        self.status.is_none_or(|s| s == b.status)
            && self.resource_id.is_none_or(|r| r == b.resource_id)
            && self.kind.is_none_or(|k| k == kind)
            && self.owner.is_none_or(|o| b.is_owned_by(o))
            && self.from.is_none_or(|from| b.span.end > from)
            && self.to.is_none_or(|to| b.span.start < to)
    }
}

/// What an actor may read of the member bookings.
enum Scope {
    All,
    Owner(Ulid),
    /// A driver sees their own bookings and the trips they drive.
    Driver { user_id: Ulid, driver_id: Option<Ulid> },
}

impl Scope {
    fn sees(&self, b: &Booking) -> bool {
        match self {
            Scope::All => true,
            Scope::Owner(user_id) => b.is_owned_by(*user_id),
            Scope::Driver { user_id, driver_id } => {
                b.is_owned_by(*user_id)
                    || (driver_id.is_some() && b.trip.map(|t| t.driver_id) == *driver_id)
            }
        }
    }
}

impl Engine {
    fn scope_of(&self, actor: &Actor) -> Scope {
        match actor.role {
            Role::Admin | Role::Approver => Scope::All,
            Role::Employee => Scope::Owner(actor.id),
            Role::Driver => Scope::Driver {
                user_id: actor.id,
                driver_id: self.directory.driver_for_user(&actor.id).map(|d| d.id),
            },
        }
    }

    /// Unscoped read of any booking with its resource.
    pub(super) async fn read_booking(&self, id: &Ulid) -> Option<(Booking, ResourceInfo)> {
        let resource_id = self.bookings.get(id)?.resource_id;
        let rs = self.get_resource(&resource_id)?;
        let guard = rs.read().await;
        let booking = guard.booking(id)?.clone();
        Some((booking, guard.info()))
    }

    pub async fn get_booking(&self, id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        let (booking, _) = self
            .read_booking(&id)
            .await
            .ok_or(EngineError::NotFound("booking", id))?;
        let scope = self.scope_of(actor);
        if booking.party.is_guest() && !actor.is_admin() {
            return Err(EngineError::NotFound("booking", id));
        }
        if !scope.sees(&booking) {
            return Err(EngineError::forbidden("you can only view your own bookings"));
        }
        Ok(booking)
    }

    /// Member bookings visible to `actor`, newest request first.
    pub async fn list_bookings(&self, actor: &Actor, filter: &BookingFilter) -> Vec<Booking> {
        let scope = self.scope_of(actor);
        self.collect_bookings(|b, kind| !b.party.is_guest() && scope.sees(b) && filter.admits(b, kind))
            .await
    }

    pub async fn list_guest_bookings(
        &self,
        actor: &Actor,
        status: Option<BookingStatus>,
        resource_id: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can list guest bookings"));
        }
        Ok(self
            .collect_bookings(|b, _| {
                b.party.is_guest()
                    && status.is_none_or(|s| s == b.status)
                    && resource_id.is_none_or(|r| r == b.resource_id)
            })
            .await)
    }

    async fn collect_bookings(&self, keep: impl Fn(&Booking, ResourceKind) -> bool) -> Vec<Booking> {
        let resources: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in resources {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().filter(|&b| keep(b, guard.kind)).cloned());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    pub async fn approval_log(&self, id: Ulid, actor: &Actor) -> Result<Vec<ApprovalEntry>, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can read approval logs"));
        }
        let (booking, _) = self
            .read_booking(&id)
            .await
            .ok_or(EngineError::NotFound("booking", id))?;
        Ok(booking.approval_log)
    }

    pub fn driver_ratings(&self, driver_id: &Ulid) -> Result<RatingSummary, EngineError> {
        self.directory
            .driver(driver_id)
            .ok_or(EngineError::NotFound("driver", *driver_id))?;
        let mut ratings = self.directory.ratings_for(driver_id);
        ratings.sort_by(|a, b| b.at.cmp(&a.at));
        let average_rating = (!ratings.is_empty()).then(|| {
            let sum: u32 = ratings.iter().map(|r| u32::from(r.rating)).sum();
            let avg = f64::from(sum) / ratings.len() as f64;
            (avg * 100.0).round() / 100.0
        });
        Ok(RatingSummary {
            driver_id: *driver_id,
            total_ratings: ratings.len(),
            average_rating,
            ratings,
        })
    }

    /// Most recent audit entries, newest first.
    pub fn audit_log(&self, actor: &Actor, limit: usize) -> Result<Vec<AuditEntry>, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::forbidden("only an admin can read the audit log"));
        }
        Ok(lock(&self.audit).recent(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(owner: Ulid, start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            span: Span::new(start, end),
            purpose: "p".into(),
            status,
            party: Party::Member { user_id: owner },
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

    #[test]
    fn filter_window_is_half_open() {
        let b = booking(Ulid::new(), 100, 200, BookingStatus::Pending);
        let window = |from, to| BookingFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        };
        assert!(window(150, 300).admits(&b, ResourceKind::Room));
        assert!(!window(200, 300).admits(&b, ResourceKind::Room));
        assert!(!window(0, 100).admits(&b, ResourceKind::Room));
    }

    #[test]
    fn filter_by_status_kind_and_owner() {
        let owner = Ulid::new();
        let b = booking(owner, 100, 200, BookingStatus::Approved);
        let f = BookingFilter {
            status: Some(BookingStatus::Approved),
            kind: Some(ResourceKind::Vehicle),
            owner: Some(owner),
            ..Default::default()
        };
        assert!(f.admits(&b, ResourceKind::Vehicle));
        assert!(!f.admits(&b, ResourceKind::Room));
        let other = BookingFilter {
            owner: Some(Ulid::new()),
            ..Default::default()
        };
        assert!(!other.admits(&b, ResourceKind::Vehicle));
    }

    #[test]
    fn driver_scope_covers_own_and_driven() {
        let (user_id, driver_id) = (Ulid::new(), Ulid::new());
        let scope = Scope::Driver {
            user_id,
            driver_id: Some(driver_id),
        };
        let mut driven = booking(Ulid::new(), 0, 1, BookingStatus::Approved);
        assert!(!scope.sees(&driven));
        driven.trip = Some(Trip {
            driver_id,
            vehicle_id: Ulid::new(),
            assigned_at: 0,
        });
        assert!(scope.sees(&driven));
        assert!(scope.sees(&booking(user_id, 0, 1, BookingStatus::Pending)));

        let unregistered = Scope::Driver {
            user_id,
            driver_id: None,
        };
        assert!(!unregistered.sees(&booking(Ulid::new(), 0, 1, BookingStatus::Pending)));
    }
}
