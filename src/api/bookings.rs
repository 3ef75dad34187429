use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ulid::Ulid;

use crate::model::{ApprovalEntry, DriverRating};

use super::actor::{require_admin, CurrentActor};
use super::error::ApiError;
use super::views::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn note_of(body: Option<Json<NoteRequest>>) -> Option<String> {
    body.and_then(|Json(b)| b.note)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let booking = state.engine.create_booking(&actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListBookingsQuery>,
) -> ApiResult<Vec<BookingView>> {
    let bookings = state.engine.list_bookings(&actor, &query.into()).await;
    Ok(Json(booking_views(bookings)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.get_booking(id, &actor).await?.into()))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.cancel_booking(id, &actor).await?.into()))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<BookingView> {
    let booking = state.engine.approve_booking(id, &actor, note_of(body)).await?;
    Ok(Json(booking.into()))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<BookingView> {
    let booking = state.engine.reject_booking(id, &actor, note_of(body)).await?;
    Ok(Json(booking.into()))
}

pub async fn assign(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<AssignTripRequest>,
) -> ApiResult<BookingView> {
    let booking = state
        .engine
        .assign_trip(id, &actor, req.driver_id, req.vehicle_id)
        .await?;
    Ok(Json(booking.into()))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.start_booking(id, &actor).await?.into()))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.complete_booking(id, &actor).await?.into()))
}

pub async fn rate(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    Json(req): Json<RateDriverRequest>,
) -> Result<(StatusCode, Json<DriverRating>), ApiError> {
    let rating = state
        .engine
        .rate_driver(id, &actor, req.rating, req.review)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn approvals(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<Vec<ApprovalEntry>> {
    Ok(Json(state.engine.approval_log(id, &actor).await?))
}

pub async fn sweep(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<SweepView> {
    require_admin(&actor)?;
    let marked_overdue = state.engine.mark_overdue().await?;
    Ok(Json(SweepView { marked_overdue }))
}
