//! JSON error envelope shared by every endpoint:
//! `{"error": {"code": "BOOKING_CONFLICT", "message": "..."}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, ErrorClass};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match (err.class(), err) {
        (_, EngineError::Unauthenticated) => StatusCode::UNAUTHORIZED,
        (_, EngineError::LimitExceeded(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        (ErrorClass::Validation, _) => StatusCode::BAD_REQUEST,
        (ErrorClass::State, _) => StatusCode::CONFLICT,
        (ErrorClass::Access, _) => StatusCode::FORBIDDEN,
        (ErrorClass::Missing, _) => StatusCode::NOT_FOUND,
        (ErrorClass::Internal, _) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!("request failed: {err}");
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookingStatus;
    use ulid::Ulid;

    #[test]
    fn classes_map_to_statuses() {
        let cases = [
            (EngineError::InvalidDateRange, StatusCode::BAD_REQUEST),
            (EngineError::NoteRequired, StatusCode::BAD_REQUEST),
            (EngineError::LimitExceeded("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (EngineError::BookingConflict(Ulid::new()), StatusCode::CONFLICT),
            (EngineError::BookingNotPending(BookingStatus::Approved), StatusCode::CONFLICT),
            (EngineError::SelfApproval, StatusCode::FORBIDDEN),
            (EngineError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (EngineError::TokenNotFound, StatusCode::NOT_FOUND),
            (EngineError::WalError("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
