use ulid::Ulid;

use crate::model::BookingStatus;

/// Coarse error family, so callers can tell "fix the input" from "this
/// will never succeed" without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    State,
    Access,
    Missing,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(&'static str, Ulid),
    TokenNotFound,
    ResourceUnavailable(Ulid),
    InvalidDateRange,
    BookingConflict(Ulid),
    BookingNotPending(BookingStatus),
    SelfApproval,
    Forbidden(String),
    DriverNotAssigned(Ulid),
    InvalidTransition {
        status: BookingStatus,
        action: &'static str,
    },
    NoteRequired,
    InvalidRating(u8),
    InvalidInput(String),
    AlreadyExists(String),
    Unauthenticated,
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Forbidden(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) | EngineError::TokenNotFound => "NOT_FOUND",
            EngineError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            EngineError::InvalidDateRange => "INVALID_DATE_RANGE",
            EngineError::BookingConflict(_) => "BOOKING_CONFLICT",
            EngineError::BookingNotPending(_) => "BOOKING_NOT_PENDING",
            EngineError::SelfApproval => "SELF_APPROVAL",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::DriverNotAssigned(_) => "DRIVER_NOT_ASSIGNED",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::NoteRequired => "NOTE_REQUIRED",
            EngineError::InvalidRating(_) => "INVALID_RATING",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::Unauthenticated => "UNAUTHENTICATED",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::WalError(_) => "INTERNAL",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidDateRange
            | EngineError::NoteRequired
            | EngineError::InvalidRating(_)
            | EngineError::InvalidInput(_)
            | EngineError::LimitExceeded(_) => ErrorClass::Validation,
            EngineError::ResourceUnavailable(_)
            | EngineError::BookingConflict(_)
            | EngineError::BookingNotPending(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::AlreadyExists(_)
            | EngineError::DriverNotAssigned(_) => ErrorClass::State,
            EngineError::SelfApproval
            | EngineError::Forbidden(_)
            | EngineError::Unauthenticated => ErrorClass::Access,
            EngineError::NotFound(..) | EngineError::TokenNotFound => ErrorClass::Missing,
            EngineError::WalError(_) => ErrorClass::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            EngineError::TokenNotFound => write!(f, "no guest booking for this access token"),
            EngineError::ResourceUnavailable(id) => {
                write!(f, "resource {id} is not available for booking")
            }
            EngineError::InvalidDateRange => write!(f, "end time must be after start time"),
            EngineError::BookingConflict(id) => {
                write!(f, "time slot overlaps active booking {id}")
            }
            EngineError::BookingNotPending(status) => {
                write!(f, "booking is not pending (status: {status})")
            }
            EngineError::SelfApproval => write!(f, "cannot approve or reject your own booking"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::DriverNotAssigned(id) => {
                write!(f, "driver {id} has no active duty assignment")
            }
            EngineError::InvalidTransition { status, action } => {
                write!(f, "cannot {action} a booking in status {status}")
            }
            EngineError::NoteRequired => write!(f, "a non-empty note is required"),
            EngineError::InvalidRating(r) => write!(f, "rating must be between 1 and 5, got {r}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::Unauthenticated => write!(f, "unknown or inactive user"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_state_errors_are_distinguishable() {
        assert_eq!(EngineError::InvalidDateRange.class(), ErrorClass::Validation);
        assert_eq!(EngineError::NoteRequired.class(), ErrorClass::Validation);
        assert_eq!(EngineError::BookingConflict(Ulid::new()).class(), ErrorClass::State);
        assert_eq!(
            EngineError::BookingNotPending(BookingStatus::Approved).class(),
            ErrorClass::State
        );
        assert_eq!(EngineError::SelfApproval.class(), ErrorClass::Access);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::BookingConflict(Ulid::new()).code(), "BOOKING_CONFLICT");
        assert_eq!(EngineError::SelfApproval.code(), "SELF_APPROVAL");
        assert_eq!(EngineError::forbidden("x").code(), "FORBIDDEN");
        assert_eq!(
            EngineError::BookingNotPending(BookingStatus::Cancelled).to_string(),
            "booking is not pending (status: CANCELLED)"
        );
    }
}
