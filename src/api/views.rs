//! Wire shapes. Requests deserialize straight from JSON bodies and query
//! strings; responses never carry a guest's token digest.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{BookingFilter, GuestReceipt, NewBooking, NewGuestBooking};
use crate::model::*;

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub name: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub kind: Option<ResourceKind>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: ResourceStatus,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDriverRequest {
    pub user_id: Ulid,
    pub license_number: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignDutyRequest {
    pub vehicle_id: Ulid,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVehicleRequest {
    pub resource_id: Ulid,
    pub plate_number: String,
    pub brand: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(r: CreateBookingRequest) -> Self {
        NewBooking {
            resource_id: r.resource_id,
            start: r.start,
            end: r.end,
            purpose: r.purpose,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTripRequest {
    pub driver_id: Ulid,
    pub vehicle_id: Ulid,
}

#[derive(Debug, Deserialize)]
pub struct RateDriverRequest {
    pub rating: u8,
    pub review: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub status: Option<BookingStatus>,
    pub resource_id: Option<Ulid>,
    pub kind: Option<ResourceKind>,
    pub owner: Option<Ulid>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

impl From<ListBookingsQuery> for BookingFilter {
    fn from(q: ListBookingsQuery) -> Self {
        BookingFilter {
            status: q.status,
            resource_id: q.resource_id,
            kind: q.kind,
            owner: q.owner,
            from: q.from,
            to: q.to,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListGuestBookingsQuery {
    pub status: Option<BookingStatus>,
    pub resource_id: Option<Ulid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGuestBookingRequest {
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
}

impl From<CreateGuestBookingRequest> for NewGuestBooking {
    fn from(r: CreateGuestBookingRequest) -> Self {
        NewGuestBooking {
            resource_id: r.resource_id,
            start: r.start,
            end: r.end,
            purpose: r.purpose,
            name: r.name,
            email: r.email,
            phone: r.phone,
            department: r.department,
        }
    }
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingView {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
    pub status: BookingStatus,
    pub requester_id: Option<Ulid>,
    pub guest: Option<GuestContact>,
    pub approved_by: Option<Ulid>,
    pub approved_at: Option<Ms>,
    pub rejection_note: Option<String>,
    pub trip: Option<Trip>,
    pub returned_at: Option<Ms>,
    pub rating: Option<DriverRating>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        let (requester_id, guest) = match b.party {
            Party::Member { user_id } => (Some(user_id), None),
            Party::Guest { contact, .. } => (None, Some(contact)),
        };
        BookingView {
            id: b.id,
            resource_id: b.resource_id,
            start: b.span.start,
            end: b.span.end,
            purpose: b.purpose,
            status: b.status,
            requester_id,
            guest,
            approved_by: b.approval.map(|a| a.by),
            approved_at: b.approval.map(|a| a.at),
            rejection_note: b.rejection_note,
            trip: b.trip,
            returned_at: b.returned_at,
            rating: b.rating,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

pub fn booking_views(bookings: Vec<Booking>) -> Vec<BookingView> {
    bookings.into_iter().map(BookingView::from).collect()
}

/// The only response that ever carries the raw access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct GuestReceiptView {
    pub booking: BookingView,
    pub access_token: String,
}

impl From<GuestReceipt> for GuestReceiptView {
    fn from(r: GuestReceipt) -> Self {
        GuestReceiptView {
            booking: r.booking.into(),
            access_token: r.access_token,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DutyView {
    pub active: Option<DutyAssignment>,
    pub history: Vec<DutyAssignment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepView {
    pub marked_overdue: usize,
}
