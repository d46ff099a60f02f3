//! API service routes

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{middleware::auth_middleware, realtime, state::AppState};

pub mod admin;
pub mod bookings;
pub mod contact;
pub mod payments;
pub mod wallet;
pub mod workers;

/// Successful response body
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/assign", post(bookings::assign_worker))
        .route("/api/bookings/:id/status", patch(bookings::update_status))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/pay", post(bookings::pay_booking))
        .route("/api/workers/available", get(workers::available_workers))
        .route(
            "/api/workers/me/availability",
            patch(workers::set_availability),
        )
        .route("/api/workers/me/check-in", post(workers::check_in))
        .route("/api/workers/me/check-out", post(workers::check_out))
        .route("/api/workers/me/attendance", get(workers::attendance))
        .route("/api/workers/:id", get(workers::get_worker))
        .route("/api/payments/create-order", post(payments::create_order))
        .route("/api/payments/verify", post(payments::verify_payment))
        .route("/api/wallet", get(wallet::wallet))
        .route("/api/transactions", get(wallet::transactions))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/users", get(admin::users))
        .route(
            "/api/admin/workers/:id/deactivate",
            post(admin::deactivate_worker),
        )
        .route("/api/admin/payouts/settle", post(admin::settle_payouts))
        .route("/api/admin/contacts", get(admin::contacts))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/api/contact", post(contact::submit))
        // Authenticates from the query string as well as the header
        .route("/ws", get(realtime::ws_handler))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
