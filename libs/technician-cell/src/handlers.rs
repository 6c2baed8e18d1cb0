use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_admin, require_technician_or_admin, user_uuid};
use shared_utils::AppState;

use crate::models::{
    CalendarQuery, CreateShiftsRequest, LocationDaysQuery, LocationQuery, ShiftListQuery,
    TechnicianFilterRequest,
};
use crate::services::shift::ShiftService;
use crate::services::technician::TechnicianDirectory;

// ==============================================================================
// TECHNICIAN SELF-SERVICE
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_shifts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    require_technician_or_admin(&user)?;
    let technician_id = user_uuid(&user)?;

    let calendar = ShiftService::new(&state)
        .get_calendar(technician_id, query.days, query.include_cancelled)
        .await?;

    Ok(Json(json!(calendar)))
}

/// Self-service planning: shifts are unlocked and the refreshed calendar is
/// returned.
#[axum::debug_handler]
pub async fn create_my_shifts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateShiftsRequest>,
) -> Result<Json<Value>, AppError> {
    require_technician_or_admin(&user)?;
    let technician_id = user_uuid(&user)?;

    let service = ShiftService::new(&state);
    let created = service
        .create_shifts(technician_id, request.items, technician_id, false)
        .await?;
    let calendar = service.get_calendar(technician_id, None, false).await?;

    Ok(Json(json!({
        "created": created.len(),
        "calendar": calendar
    })))
}

// ==============================================================================
// BOOKING HELPERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_locations(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let locations = ShiftService::new(&state).list_locations().await?;
    Ok(Json(json!(locations)))
}

#[axum::debug_handler]
pub async fn list_location_services(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Value>, AppError> {
    let services = TechnicianDirectory::new(state.store.clone())
        .list_services_for_location(query.location_id)
        .await?;
    Ok(Json(json!(services)))
}

#[axum::debug_handler]
pub async fn list_location_days(
    State(state): State<AppState>,
    Query(query): Query<LocationDaysQuery>,
) -> Result<Json<Value>, AppError> {
    let days = ShiftService::new(&state)
        .location_day_summary(query.location_id, query.days)
        .await?;
    Ok(Json(json!(days)))
}

#[axum::debug_handler]
pub async fn list_location_technicians(
    State(state): State<AppState>,
    Json(request): Json<TechnicianFilterRequest>,
) -> Result<Json<Value>, AppError> {
    let technicians = TechnicianDirectory::new(state.store.clone())
        .list_for_services(request.location_id, &request.service_ids)
        .await?;
    Ok(Json(json!(technicians)))
}

// ==============================================================================
// ADMIN
// ==============================================================================

/// Admin-planned shifts are locked.
#[axum::debug_handler]
pub async fn admin_create_shifts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(technician_id): Path<Uuid>,
    Json(request): Json<CreateShiftsRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let admin_id = user_uuid(&user)?;
    debug!("Admin {} planning shifts for technician {}", admin_id, technician_id);

    let created = ShiftService::new(&state)
        .create_shifts(technician_id, request.items, admin_id, true)
        .await?;

    Ok(Json(json!({
        "created": created.len(),
        "shifts": created
    })))
}

#[axum::debug_handler]
pub async fn admin_list_shifts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ShiftListQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let shifts = ShiftService::new(&state).list_shifts(&query).await?;
    Ok(Json(json!({
        "shifts": shifts,
        "total": shifts.len()
    })))
}

#[axum::debug_handler]
pub async fn admin_get_shift_calendar(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(technician_id): Path<Uuid>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let calendar = ShiftService::new(&state)
        .get_calendar(technician_id, query.days, query.include_cancelled)
        .await?;
    Ok(Json(json!(calendar)))
}

#[axum::debug_handler]
pub async fn admin_cancel_shift(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(shift_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let admin_id = user_uuid(&user)?;

    let shift = ShiftService::new(&state).cancel_shift(shift_id, admin_id).await?;
    Ok(Json(json!(shift)))
}
