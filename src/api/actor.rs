use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::Actor;

use super::error::ApiError;
use super::AppState;

/// Header carrying the caller's directory user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved against the user directory.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Ulid::from_string(v.trim()).ok())
            .ok_or(EngineError::Unauthenticated)?;
        let user = state
            .engine
            .directory()
            .user(&id)
            .filter(|u| u.active)
            .ok_or(EngineError::Unauthenticated)?;
        Ok(CurrentActor(Actor::from(&user)))
    }
}

pub fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::forbidden("admin access required").into())
    }
}
