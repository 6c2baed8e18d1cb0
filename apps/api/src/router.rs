use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use shared_utils::AppState;
use technician_cell::router::{admin_shift_routes, shift_routes};

pub fn create_router(state: AppState) -> Router {
    let schedule = shift_routes(state.clone()).merge(appointment_routes(state.clone()));

    Router::new()
        .route("/", get(|| async { "Booking API is running!" }))
        .nest("/schedule", schedule)
        .nest("/admin", admin_shift_routes(state))
}
