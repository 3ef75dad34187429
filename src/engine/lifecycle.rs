//! The single transition core behind both the member and the guest booking
//! workflows. A `Lane` supplies the per-workflow status table; an
//! `Authority` says who is asking. Everything else (locking, the approval
//! conflict re-check, persistence, notices) is shared.

use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::notify::Notice;

use super::conflict::check_no_conflict;
use super::{Engine, EngineError};

/// Which workflow a booking belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Member,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Cancel,
    Approve,
    Reject,
    Start,
    Complete,
    MarkOverdue,
}

/// Proof of who is driving a transition.
#[derive(Debug, Clone, Copy)]
pub enum Authority<'a> {
    /// An authenticated directory user.
    Member(&'a Actor),
    /// Whoever presented the guest booking's access token.
    TokenHolder,
    /// The overdue sweeper.
    System,
}

impl Authority<'_> {
    fn actor_id(&self) -> Option<Ulid> {
        match self {
            Authority::Member(actor) => Some(actor.id),
            Authority::TokenHolder | Authority::System => None,
        }
    }
}

impl Lane {
    pub fn of(party: &Party) -> Self {
        match party {
            Party::Member { .. } => Lane::Member,
            Party::Guest { .. } => Lane::Guest,
        }
    }

    fn entity(self) -> &'static str {
        match self {
            Lane::Member => "booking",
            Lane::Guest => "guest booking",
        }
    }

    /// Statuses a transition may leave from in this lane.
    pub fn sources(self, t: Transition) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match (self, t) {
            (_, Transition::Cancel | Transition::Approve | Transition::Reject) => &[Pending],
            (_, Transition::Start) => &[Approved],
            (Lane::Member, Transition::Complete) => &[Ongoing, Overdue],
            (Lane::Guest, Transition::Complete) => &[Approved, Ongoing],
            (Lane::Member, Transition::MarkOverdue) => &[Approved],
            (Lane::Guest, Transition::MarkOverdue) => &[],
        }
    }
}

impl Transition {
    pub fn target(self) -> BookingStatus {
        match self {
            Transition::Cancel => BookingStatus::Cancelled,
            Transition::Approve => BookingStatus::Approved,
            Transition::Reject => BookingStatus::Rejected,
            Transition::Start => BookingStatus::Ongoing,
            Transition::Complete => BookingStatus::Completed,
            Transition::MarkOverdue => BookingStatus::Overdue,
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            Transition::Cancel => "cancel",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::MarkOverdue => "mark_overdue",
        }
    }

    /// Transitions whose only legal source is PENDING report
    /// `BookingNotPending` rather than a generic transition error.
    fn pending_gated(self) -> bool {
        matches!(self, Transition::Cancel | Transition::Approve | Transition::Reject)
    }
}

impl Engine {
    pub(super) async fn transition(
        &self,
        booking_id: Ulid,
        lane: Lane,
        t: Transition,
        authority: Authority<'_>,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        self.transition_locked(&mut guard, booking_id, lane, t, authority, note)
            .await
    }

    /// Run one transition against an already write-locked resource:
    /// authority → source status → transition-specific checks → WAL → apply.
    pub(super) async fn transition_locked(
        &self,
        rs: &mut ResourceState,
        booking_id: Ulid,
        lane: Lane,
        t: Transition,
        authority: Authority<'_>,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let now = self.now();
        let booking = rs
            .booking(&booking_id)
            .filter(|b| Lane::of(&b.party) == lane)
            .cloned()
            .ok_or(EngineError::NotFound(lane.entity(), booking_id))?;

        self.authorize(lane, t, &authority, &booking)?;

        let from = booking.status;
        if !lane.sources(t).contains(&from) {
            return Err(if t.pending_gated() {
                EngineError::BookingNotPending(from)
            } else {
                EngineError::InvalidTransition {
                    status: from,
                    action: t.action(),
                }
            });
        }

        match t {
            Transition::Start => self.check_start(rs.kind, lane, &authority, &booking, now)?,
            // Other bookings may have moved since this one was requested.
            Transition::Approve => check_no_conflict(rs, &booking.span, Some(booking_id))?,
            _ => {}
        }

        let to = t.target();
        let event = Event::BookingStatusChanged {
            id: booking_id,
            resource_id: rs.id,
            from,
            to,
            actor: authority.actor_id(),
            note,
            at: now,
        };
        self.persist_and_apply(rs, &event).await?;

        metrics::counter!(
            crate::observability::TRANSITIONS_TOTAL,
            "action" => t.action(),
            "status" => to.as_str()
        )
        .increment(1);
        info!("{} {booking_id}: {from} -> {to}", lane.entity());

        let updated = rs
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(lane.entity(), booking_id))?;
        if matches!(t, Transition::Approve | Transition::Reject) {
            self.send_notice(&rs.name, &updated);
        }
        Ok(updated)
    }

    fn authorize(
        &self,
        lane: Lane,
        t: Transition,
        authority: &Authority<'_>,
        booking: &Booking,
    ) -> Result<(), EngineError> {
        match (t, authority) {
            (Transition::MarkOverdue, Authority::System) => Ok(()),
            (Transition::MarkOverdue, _) | (_, Authority::System) => {
                Err(EngineError::forbidden("only the overdue sweeper may do this"))
            }
            (Transition::Cancel | Transition::Complete, Authority::TokenHolder) => match lane {
                Lane::Guest => Ok(()),
                Lane::Member => Err(EngineError::forbidden("access tokens only apply to guest bookings")),
            },
            (_, Authority::TokenHolder) => Err(EngineError::forbidden(
                "an access token only allows cancelling or completing",
            )),
            (Transition::Cancel, Authority::Member(actor)) => match lane {
                Lane::Member if actor.is_admin() || booking.is_owned_by(actor.id) => Ok(()),
                Lane::Member => Err(EngineError::forbidden("you can only cancel your own bookings")),
                Lane::Guest => Err(EngineError::forbidden(
                    "guest bookings are cancelled with their access token",
                )),
            },
            (Transition::Approve | Transition::Reject, Authority::Member(actor)) => {
                if lane == Lane::Member && booking.is_owned_by(actor.id) {
                    return Err(EngineError::SelfApproval);
                }
                if lane == Lane::Guest && !actor.is_admin() {
                    return Err(EngineError::forbidden(
                        "only an admin can approve or reject guest bookings",
                    ));
                }
                if !self.policy.permits(actor.role) {
                    return Err(EngineError::forbidden(format!(
                        "{:?} may not approve or reject bookings",
                        actor.role
                    )));
                }
                Ok(())
            }
            (Transition::Start, Authority::Member(actor)) => match (lane, actor.role) {
                (_, Role::Admin) | (Lane::Member, Role::Driver) => Ok(()),
                _ => Err(EngineError::forbidden(
                    "only an admin or the assigned driver can start a booking",
                )),
            },
            (Transition::Complete, Authority::Member(actor)) => match lane {
                Lane::Member if actor.is_admin() => Ok(()),
                Lane::Member => Err(EngineError::forbidden("only an admin can complete a booking")),
                Lane::Guest => Err(EngineError::forbidden(
                    "guest bookings are completed with their access token",
                )),
            },
        }
    }

    fn check_start(
        &self,
        kind: ResourceKind,
        lane: Lane,
        authority: &Authority<'_>,
        booking: &Booking,
        now: Ms,
    ) -> Result<(), EngineError> {
        if let Authority::Member(actor) = authority
            && actor.role == Role::Driver
        {
            let driver_id = self.directory.driver_for_user(&actor.id).map(|d| d.id);
            let assigned = booking.trip.map(|trip| trip.driver_id);
            if driver_id.is_none() || assigned != driver_id {
                return Err(EngineError::forbidden("you are not assigned to this booking"));
            }
        }
        if lane == Lane::Member && kind == ResourceKind::Vehicle {
            if now < booking.span.start {
                return Err(EngineError::forbidden(
                    "trip cannot be started before scheduled time",
                ));
            }
            if !booking.span.admits(now) {
                return Err(EngineError::forbidden("booking period has already ended"));
            }
        }
        Ok(())
    }

    /// Best-effort notice to the requester; never fails the transition.
    fn send_notice(&self, resource_name: &str, booking: &Booking) {
        let recipient = match &booking.party {
            Party::Member { user_id } => self
                .directory
                .user(user_id)
                .map(|u| (u.name, u.email)),
            Party::Guest { contact, .. } => Some((contact.name.clone(), contact.email.clone())),
        };
        let Some((recipient_name, recipient_email)) = recipient else {
            debug!("no recipient for booking {}, notice skipped", booking.id);
            return;
        };
        self.notify.send(Notice {
            recipient_name,
            recipient_email,
            booking_id: booking.id,
            resource_name: resource_name.to_string(),
            status: booking.status,
            note: booking.approval_log.last().and_then(|e| e.note.clone()),
        });
    }
}
