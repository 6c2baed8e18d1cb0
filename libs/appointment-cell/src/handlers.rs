use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_admin, user_uuid};
use shared_utils::AppState;

use crate::models::{
    AppointmentError, AvailabilityQuery, AvailabilityResponse, CreateAppointmentRequest,
    PackageAvailabilityRequest, PackageAvailabilityResponse,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let available_slots = AvailabilityService::new(&state)
        .get_available_slots(query.location_id, query.service_id, query.date)
        .await?;

    Ok(Json(AvailabilityResponse { available_slots }))
}

#[axum::debug_handler]
pub async fn get_package_availability(
    State(state): State<AppState>,
    Json(request): Json<PackageAvailabilityRequest>,
) -> Result<Json<PackageAvailabilityResponse>, AppError> {
    let available_slots = AvailabilityService::new(&state)
        .get_package_availability(&request)
        .await?;

    Ok(Json(PackageAvailabilityResponse { available_slots }))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let customer_id = user_uuid(&user)?;
    let start = state
        .calendar
        .parse_instant(&request.start_time)
        .map_err(AppointmentError::from)?;

    let appointment = AppointmentBookingService::new(&state)
        .create_appointment(customer_id, request.service_id, request.location_id, start)
        .await?;

    Ok(Json(json!(appointment)))
}

/// Only the booking customer or an admin may cancel.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = user_uuid(&user)?;
    let service = AppointmentLifecycleService::new(&state);

    let appointment = service.get_appointment(appointment_id).await?;
    if appointment.customer_id != actor && !user.is_admin() {
        debug!("User {} may not cancel appointment {}", actor, appointment_id);
        return Err(AppError::Forbidden(
            "Only the booking customer or an admin can cancel".to_string(),
        ));
    }

    let cancelled = service.cancel_appointment(appointment_id, actor).await?;
    Ok(Json(json!(cancelled)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let completed = AppointmentLifecycleService::new(&state)
        .complete_appointment(appointment_id)
        .await?;
    Ok(Json(json!(completed)))
}
