//! HTTP/JSON surface. Every handler is a thin shim over one engine call;
//! identity comes from the `X-User-Id` header, guests use their token.

pub mod actor;
pub mod admin;
pub mod bookings;
pub mod error;
pub mod guest;
pub mod views;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let resource_routes = Router::new()
        .route("/", post(admin::create_resource).get(admin::list_resources))
        .route("/:id", get(admin::get_resource).delete(admin::delete_resource))
        .route("/:id/status", put(admin::set_resource_status))
        .route("/:id/maintenance/begin", post(admin::begin_maintenance))
        .route("/:id/maintenance/end", post(admin::end_maintenance));

    let directory_routes = Router::new()
        .route("/api/me", get(admin::me))
        .route("/api/users", post(admin::register_user).get(admin::list_users))
        .route("/api/users/:id/active", put(admin::set_user_active))
        .route("/api/drivers", post(admin::register_driver).get(admin::list_drivers))
        .route("/api/drivers/:id/active", put(admin::set_driver_active))
        .route(
            "/api/drivers/:id/duty",
            post(admin::assign_duty).delete(admin::release_duty).get(admin::duty),
        )
        .route("/api/drivers/:id/ratings", get(admin::ratings))
        .route("/api/vehicles", post(admin::register_vehicle).get(admin::list_vehicles))
        .route("/api/audit", get(admin::audit));

    let booking_routes = Router::new()
        .route("/", post(bookings::create).get(bookings::list))
        .route("/sweep", post(bookings::sweep))
        .route("/:id", get(bookings::get))
        .route("/:id/cancel", post(bookings::cancel))
        .route("/:id/approve", post(bookings::approve))
        .route("/:id/reject", post(bookings::reject))
        .route("/:id/assign", post(bookings::assign))
        .route("/:id/start", post(bookings::start))
        .route("/:id/complete", post(bookings::complete))
        .route("/:id/rating", post(bookings::rate))
        .route("/:id/approvals", get(bookings::approvals));

    let guest_routes = Router::new()
        .route("/", post(guest::create).get(guest::list))
        .route("/:token", get(guest::get))
        .route("/:token/complete", post(guest::complete))
        .route("/:token/cancel", post(guest::cancel))
        .route("/id/:id/approve", post(guest::approve))
        .route("/id/:id/reject", post(guest::reject))
        .route("/id/:id/start", post(guest::start));

    Router::new()
        .route("/health", get(health))
        .nest("/api/resources", resource_routes)
        .nest("/api/bookings", booking_routes)
        .nest("/api/guest-bookings", guest_routes)
        .merge(directory_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
