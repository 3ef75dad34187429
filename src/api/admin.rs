//! Directory and fleet management. Admin gating happens in the engine
//! except where the engine call takes no actor.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ulid::Ulid;

use crate::limits::MAX_AUDIT_ENTRIES;
use crate::model::*;

use super::actor::{require_admin, CurrentActor};
use super::error::ApiError;
use super::views::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

// ── Resources ────────────────────────────────────────────────────

pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateResourceRequest>,
) -> Created<ResourceInfo> {
    let info = state.engine.create_resource(&actor, &req.name, req.kind).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Query(query): Query<ListResourcesQuery>,
) -> ApiResult<Vec<ResourceInfo>> {
    Ok(Json(state.engine.list_resources(query.kind).await))
}

pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<ResourceInfo> {
    Ok(Json(state.engine.get_resource_info(&id).await?))
}

pub async fn set_resource_status(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<ResourceInfo> {
    Ok(Json(state.engine.set_resource_status(id, req.status, &actor).await?))
}

pub async fn begin_maintenance(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<ResourceInfo> {
    Ok(Json(state.engine.begin_maintenance(id, &actor).await?))
}

pub async fn end_maintenance(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<ResourceInfo> {
    Ok(Json(state.engine.end_maintenance(id, &actor).await?))
}

pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_resource(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Users ────────────────────────────────────────────────────────

pub async fn me(State(state): State<Arc<AppState>>, CurrentActor(actor): CurrentActor) -> ApiResult<User> {
    Ok(Json(state.engine.get_user(&actor.id)?))
}

pub async fn register_user(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RegisterUserRequest>,
) -> Created<User> {
    let user = state
        .engine
        .register_user(&actor, &req.name, &req.email, req.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Vec<User>> {
    require_admin(&actor)?;
    Ok(Json(state.engine.directory().users()))
}

pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResult<User> {
    Ok(Json(state.engine.set_user_active(&actor, id, req.active).await?))
}

// ── Drivers ──────────────────────────────────────────────────────

pub async fn register_driver(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RegisterDriverRequest>,
) -> Created<Driver> {
    let driver = state
        .engine
        .register_driver(&actor, req.user_id, &req.license_number, &req.phone)
        .await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Vec<Driver>> {
    require_admin(&actor)?;
    Ok(Json(state.engine.directory().drivers()))
}

pub async fn set_driver_active(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResult<Driver> {
    Ok(Json(state.engine.set_driver_active(&actor, id, req.active).await?))
}

pub async fn assign_duty(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<AssignDutyRequest>,
) -> Created<DutyAssignment> {
    let duty = state.engine.assign_duty(&actor, id, req.vehicle_id).await?;
    Ok((StatusCode::CREATED, Json(duty)))
}

pub async fn release_duty(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<DutyAssignment> {
    Ok(Json(state.engine.release_duty(&actor, id).await?))
}

pub async fn duty(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<DutyView> {
    require_admin(&actor)?;
    let history = state.engine.duty_history(&id)?;
    let active = state.engine.active_duty(&id);
    Ok(Json(DutyView { active, history }))
}

pub async fn ratings(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<RatingSummary> {
    require_admin(&actor)?;
    Ok(Json(state.engine.driver_ratings(&id)?))
}

// ── Vehicles ─────────────────────────────────────────────────────

pub async fn register_vehicle(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RegisterVehicleRequest>,
) -> Created<Vehicle> {
    let vehicle = state
        .engine
        .register_vehicle(&actor, req.resource_id, &req.plate_number, &req.brand, &req.model)
        .await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
) -> ApiResult<Vec<Vehicle>> {
    Ok(Json(state.engine.directory().vehicles()))
}

// ── Audit ────────────────────────────────────────────────────────

pub async fn audit(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let limit = query.limit.unwrap_or(100).min(MAX_AUDIT_ENTRIES);
    Ok(Json(state.engine.audit_log(&actor, limit)?))
}
