use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{Location, Service};

// ==============================================================================
// SHIFT PLANNING
// ==============================================================================

/// One day/period a technician wants to work. `period` is kept as the raw
/// key so unknown values surface as an input error rather than a 422.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftCreateItem {
    pub date: NaiveDate,
    pub period: String,
    pub location_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShiftsRequest {
    pub items: Vec<ShiftCreateItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarQuery {
    pub days: Option<i64>,
    #[serde(default)]
    pub include_cancelled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShiftListQuery {
    pub location_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub include_cancelled: bool,
}

// ==============================================================================
// CALENDAR VIEW
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub is_active: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    pub shift_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub location_name: Option<String>,
    pub locked_by_admin: bool,
    /// Informational only.
    pub has_bookings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub weekday: String,
    pub morning: CalendarSlot,
    pub afternoon: CalendarSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOption {
    pub id: Uuid,
    pub name: String,
}

impl From<&Location> for LocationOption {
    fn from(location: &Location) -> Self {
        Self {
            id: location.id,
            name: location.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftCalendar {
    pub generated_at: DateTime<Utc>,
    pub days: Vec<CalendarDay>,
    pub locations: Vec<LocationOption>,
}

// ==============================================================================
// LOCATION PICKERS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LocationQuery {
    pub location_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationDaysQuery {
    pub location_id: Uuid,
    pub days: Option<i64>,
}

/// One upcoming day at a location. A period counts as open when any active
/// shift there overlaps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDay {
    pub date: NaiveDate,
    pub weekday: String,
    pub has_morning: bool,
    pub has_afternoon: bool,
    pub technician_count: usize,
}

impl LocationDay {
    pub fn is_open(&self) -> bool {
        self.has_morning || self.has_afternoon
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOption {
    pub id: Uuid,
    pub name: String,
    pub technician_duration: i32,
    pub room_duration: i32,
}

impl From<Service> for ServiceOption {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            technician_duration: service.technician_duration,
            room_duration: service.room_duration,
        }
    }
}

// ==============================================================================
// TECHNICIAN PICKER
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TechnicianFilterRequest {
    pub location_id: Uuid,
    pub service_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianOption {
    pub id: Uuid,
    pub nickname: String,
    pub auto_assign_priority: i32,
}
