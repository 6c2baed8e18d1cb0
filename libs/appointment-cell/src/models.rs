use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::{AppError, ErrorKind};
use shared_models::{AppointmentStatus, TimeWindow};
use shared_utils::TimeError;

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub location_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    /// `HH:MM` in business time, ascending.
    pub available_slots: Vec<String>,
}

/// A provisional claim the client is still holding in its cart. Applied to
/// the technician and/or resource it names for one availability call and
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    #[serde(default)]
    pub technician_id: Option<Uuid>,
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Hold {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageAvailabilityRequest {
    pub location_id: Uuid,
    pub target_date: NaiveDate,
    pub ordered_service_ids: Vec<Uuid>,
    #[serde(default)]
    pub preferred_technician_id: Option<Uuid>,
    #[serde(default)]
    pub holds: Vec<Hold>,
}

/// One bookable start for a bundle, pinned to the representative
/// technician and the first free resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSlot {
    pub start_time: DateTime<Utc>,
    pub technician_end_time: DateTime<Utc>,
    pub resource_end_time: DateTime<Utc>,
    pub technician_id: Uuid,
    pub technician_nickname: String,
    pub resource_id: Uuid,
    pub resource_name: String,
    /// Absent when any service in the bundle has no resolvable price.
    pub price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageAvailabilityResponse {
    pub available_slots: Vec<PackageSlot>,
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub service_id: Uuid,
    pub location_id: Uuid,
    /// ISO 8601. Without an offset it is read as business-local time.
    pub start_time: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Location not found: {0}")]
    LocationNotFound(Uuid),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No technician is on shift for the full service starting at {start}")]
    NoTechnicianScheduled { start: DateTime<Utc> },

    #[error("All scheduled technicians are booked or at quota at {start}")]
    TechniciansExhausted { start: DateTime<Utc> },

    #[error("No room or bed is free for the service starting at {start}")]
    NoResourceAvailable { start: DateTime<Utc> },

    #[error("Slot was taken by a concurrent booking: {0}")]
    Conflict(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl AppointmentError {
    /// Allocation failures and lost races share one recoverable class:
    /// re-query availability and pick another slot.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::ServiceNotFound(_)
            | AppointmentError::LocationNotFound(_)
            | AppointmentError::NotFound(_) => ErrorKind::NotFound,
            AppointmentError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppointmentError::NoTechnicianScheduled { .. }
            | AppointmentError::TechniciansExhausted { .. }
            | AppointmentError::NoResourceAvailable { .. }
            | AppointmentError::Conflict(_)
            | AppointmentError::InvalidStatusTransition { .. } => ErrorKind::Conflict,
            AppointmentError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            AppointmentError::Store(_) => ErrorKind::Conflict,
        }
    }
}

impl From<StoreError> for AppointmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OverlapViolation { .. } | StoreError::Conflict(_) => {
                AppointmentError::Conflict(e.to_string())
            }
            other => AppointmentError::Store(other),
        }
    }
}

impl From<TimeError> for AppointmentError {
    fn from(e: TimeError) -> Self {
        AppointmentError::InvalidInput(e.to_string())
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        e.kind().into_app_error(e.to_string())
    }
}
