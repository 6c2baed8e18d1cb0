use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

/// Mounted under `/schedule`.
pub fn shift_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/my-shifts",
            get(handlers::get_my_shifts).post(handlers::create_my_shifts),
        )
        .route("/locations", get(handlers::list_locations))
        .route("/location-services", get(handlers::list_location_services))
        .route("/location-days", get(handlers::list_location_days))
        .route("/location-technicians", post(handlers::list_location_technicians))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted under `/admin`. Every handler checks the admin role.
pub fn admin_shift_routes(state: AppState) -> Router {
    Router::new()
        .route("/technicians/{technician_id}/shifts", post(handlers::admin_create_shifts))
        .route(
            "/technicians/{technician_id}/shift-calendar",
            get(handlers::admin_get_shift_calendar),
        )
        .route("/shifts", get(handlers::admin_list_shifts))
        .route("/shifts/{shift_id}/cancel", patch(handlers::admin_cancel_shift))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
