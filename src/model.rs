use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `end > start`.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Closed-window check used for trip starts: both endpoints count.
    pub fn admits(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Vehicle,
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Available,
    Maintenance,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    Approver,
    Admin,
    Driver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Ongoing,
    Completed,
    Cancelled,
    Overdue,
}

impl BookingStatus {
    /// Active bookings hold their slot on the resource.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Ongoing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }

    /// A trip holds its vehicle and driver only while approved or underway.
    pub fn holds_trip(self) -> bool {
        matches!(self, Self::Approved | Self::Ongoing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Ongoing => "ONGOING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Overdue => "OVERDUE",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized contact fields of an anonymous booker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub department: String,
}

/// Who a booking belongs to. Guests are identified only by the digest of
/// their access token; the token itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    Member { user_id: Ulid },
    Guest { contact: GuestContact, token_digest: String },
}

impl Party {
    pub fn member_id(&self) -> Option<Ulid> {
        match self {
            Party::Member { user_id } => Some(*user_id),
            Party::Guest { .. } => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Party::Guest { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Party::Member { .. } => "member",
            Party::Guest { .. } => "guest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub by: Ulid,
    pub at: Ms,
}

/// Per-booking driver + vehicle attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub driver_id: Ulid,
    pub vehicle_id: Ulid,
    pub assigned_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub approver_id: Ulid,
    pub action: ApprovalAction,
    pub note: Option<String>,
    pub at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRating {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub driver_id: Ulid,
    pub rated_by: Ulid,
    pub rating: u8,
    pub review: Option<String>,
    pub at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub span: Span,
    pub purpose: String,
    pub status: BookingStatus,
    pub party: Party,
    pub approval: Option<Approval>,
    pub rejection_note: Option<String>,
    pub trip: Option<Trip>,
    pub returned_at: Option<Ms>,
    pub approval_log: Vec<ApprovalEntry>,
    pub rating: Option<DriverRating>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn is_owned_by(&self, user_id: Ulid) -> bool {
        self.party.member_id() == Some(user_id)
    }
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceKind,
    pub status: ResourceStatus,
    pub created_at: Ms,
    /// Member and guest bookings alike, sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl ResourceState {
    pub fn new(id: Ulid, name: String, kind: ResourceKind, created_at: Ms) -> Self {
        Self {
            id,
            name,
            kind,
            status: ResourceStatus::Available,
            created_at,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

/// An authenticated directory user acting on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self { id: user.id, role: user.role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Ulid,
    pub user_id: Ulid,
    pub license_number: String,
    pub phone: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub plate_number: String,
    pub brand: String,
    pub model: String,
}

/// Standing driver↔vehicle duty pairing; `released_at = None` means open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyAssignment {
    pub id: Ulid,
    pub driver_id: Ulid,
    pub vehicle_id: Ulid,
    pub assigned_at: Ms,
    pub released_at: Option<Ms>,
}

impl DutyAssignment {
    pub fn is_open(&self) -> bool {
        self.released_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// `None` for system actions (the overdue sweeper).
    pub actor: Option<Ulid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Ulid,
    pub description: String,
    pub at: Ms,
}

/// The event types: flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        name: String,
        kind: ResourceKind,
        actor: Option<Ulid>,
        at: Ms,
    },
    ResourceStatusChanged {
        id: Ulid,
        status: ResourceStatus,
        actor: Option<Ulid>,
        at: Ms,
    },
    ResourceDeleted {
        id: Ulid,
        actor: Option<Ulid>,
        at: Ms,
    },
    UserRegistered {
        user: User,
        actor: Option<Ulid>,
        at: Ms,
    },
    UserActiveSet {
        id: Ulid,
        active: bool,
        actor: Option<Ulid>,
        at: Ms,
    },
    DriverRegistered {
        driver: Driver,
        actor: Option<Ulid>,
        at: Ms,
    },
    DriverActiveSet {
        id: Ulid,
        active: bool,
        actor: Option<Ulid>,
        at: Ms,
    },
    VehicleRegistered {
        vehicle: Vehicle,
        actor: Option<Ulid>,
        at: Ms,
    },
    DutyAssigned {
        id: Ulid,
        driver_id: Ulid,
        vehicle_id: Ulid,
        actor: Option<Ulid>,
        at: Ms,
    },
    DutyReleased {
        id: Ulid,
        driver_id: Ulid,
        actor: Option<Ulid>,
        at: Ms,
    },
    BookingRequested {
        id: Ulid,
        resource_id: Ulid,
        span: Span,
        purpose: String,
        party: Party,
        at: Ms,
    },
    BookingStatusChanged {
        id: Ulid,
        resource_id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
        actor: Option<Ulid>,
        note: Option<String>,
        at: Ms,
    },
    TripAssigned {
        id: Ulid,
        resource_id: Ulid,
        trip: Trip,
        actor: Option<Ulid>,
    },
    DriverRated {
        resource_id: Ulid,
        rating: DriverRating,
    },
    // Compaction-only records: they restore state without re-auditing it.
    ResourceRestored {
        id: Ulid,
        name: String,
        kind: ResourceKind,
        status: ResourceStatus,
        created_at: Ms,
    },
    UserRestored {
        user: User,
    },
    DriverRestored {
        driver: Driver,
    },
    VehicleRestored {
        vehicle: Vehicle,
    },
    BookingRestored {
        booking: Booking,
    },
    DutyRestored {
        duty: DutyAssignment,
    },
    AuditRestored {
        entry: AuditEntry,
    },
}

impl Event {
    /// The resource whose state this event mutates, for per-resource events.
    pub fn resource_id(&self) -> Option<Ulid> {
        match self {
            Event::ResourceStatusChanged { id, .. } => Some(*id),
            Event::BookingRequested { resource_id, .. }
            | Event::BookingStatusChanged { resource_id, .. }
            | Event::TripAssigned { resource_id, .. }
            | Event::DriverRated { resource_id, .. } => Some(*resource_id),
            Event::BookingRestored { booking } => Some(booking.resource_id),
            _ => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceKind,
    pub status: ResourceStatus,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub driver_id: Ulid,
    pub total_ratings: usize,
    pub average_rating: Option<f64>,
    pub ratings: Vec<DriverRating>,
}
