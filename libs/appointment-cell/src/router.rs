use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

/// Mounted under `/schedule` alongside the shift routes.
pub fn appointment_routes(state: AppState) -> Router {
    Router::new()
        .route("/availability", get(handlers::get_availability))
        .route("/package-availability", post(handlers::get_package_availability))
        .route("/appointments", post(handlers::create_appointment))
        .route("/appointments/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/appointments/{appointment_id}/complete", post(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
