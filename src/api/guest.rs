use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ulid::Ulid;

use super::actor::CurrentActor;
use super::error::ApiError;
use super::views::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Token holder ─────────────────────────────────────────────────

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGuestBookingRequest>,
) -> Result<(StatusCode, Json<GuestReceiptView>), ApiError> {
    let receipt = state.engine.create_guest_booking(req.into()).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.get_guest_booking(&token).await?.into()))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.complete_guest_booking(&token).await?.into()))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<BookingView> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.engine.cancel_guest_booking(&token, note).await?.into()))
}

// ── Staff side ───────────────────────────────────────────────────

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListGuestBookingsQuery>,
) -> ApiResult<Vec<BookingView>> {
    let bookings = state
        .engine
        .list_guest_bookings(&actor, query.status, query.resource_id)
        .await?;
    Ok(Json(booking_views(bookings)))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<BookingView> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.engine.approve_guest_booking(id, &actor, note).await?.into()))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<BookingView> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.engine.reject_guest_booking(id, &actor, note).await?.into()))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Ulid>,
) -> ApiResult<BookingView> {
    Ok(Json(state.engine.start_guest_booking(id, &actor).await?.into()))
}
