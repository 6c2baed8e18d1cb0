use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// TIME PRIMITIVES
// ==============================================================================

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "TimeWindow start must not be after end");
        Self { start, end }
    }

    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self::new(start, start + length)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully covers `other`.
    pub fn covers(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Afternoon,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Morning, Period::Afternoon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Afternoon => "afternoon",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown shift period: {0}")]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Period::Morning),
            "afternoon" => Ok(Period::Afternoon),
            other => Err(UnknownPeriod(other.to_string())),
        }
    }
}

// ==============================================================================
// CATALOG ROWS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    /// Minutes of technician time.
    pub technician_duration: i32,
    /// Minutes of room/bed time.
    pub room_duration: i32,
    /// Handoff margin added to both durations.
    #[serde(default = "default_buffer_time")]
    pub buffer_time: i32,
    #[serde(default)]
    pub slot_interval_minutes: Option<i32>,
}

fn default_buffer_time() -> i32 {
    15
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub id: Uuid,
    pub nickname: String,
    /// Services this technician may be offered for.
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
}

impl Technician {
    pub fn can_perform_all(&self, service_ids: &[Uuid]) -> bool {
        service_ids.iter().all(|id| self.service_ids.contains(id))
    }
}

/// A room or bed. Belongs to exactly one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub location_id: Uuid,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
}

impl Resource {
    pub fn can_host_all(&self, service_ids: &[Uuid]) -> bool {
        service_ids.iter().all(|id| self.service_ids.contains(id))
    }
}

// ==============================================================================
// SCHEDULE ROWS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub technician_id: Uuid,
    pub location_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub period: Option<Period>,
    pub is_cancelled: bool,
    pub locked_by_admin: bool,
    pub created_by: Uuid,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Shift {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    pub fn is_active(&self) -> bool {
        !self.is_cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianPolicy {
    pub technician_id: Uuid,
    /// `None` is the technician's global policy.
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub max_daily_online: Option<u32>,
    #[serde(default)]
    pub max_morning_online: Option<u32>,
    #[serde(default)]
    pub max_afternoon_online: Option<u32>,
    #[serde(default = "default_priority")]
    pub auto_assign_priority: i32,
    #[serde(default = "default_true")]
    pub allow_public_booking: bool,
}

pub const DEFAULT_AUTO_ASSIGN_PRIORITY: i32 = 50;

fn default_priority() -> i32 {
    DEFAULT_AUTO_ASSIGN_PRIORITY
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: Uuid,
    pub service_id: Uuid,
    #[serde(default)]
    pub technician_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    /// Price in the smallest currency unit.
    pub price: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ==============================================================================
// BOOKING LEDGER ROWS
// ==============================================================================

/// An exclusive claim on a technician's or a resource's time. `owner_id` is
/// the technician id or the resource id depending on which ledger holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub owner_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Occupancy {
    pub fn new(appointment_id: Uuid, owner_id: Uuid, window: TimeWindow) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            owner_id,
            start_time: window.start,
            end_time: window.end,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub location_id: Uuid,
    pub technician_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// A quota re-counted when a booking commits: fewer than `cap` of the
/// technician's claims may start inside `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimCap {
    pub window: TimeWindow,
    pub cap: u32,
}

impl ClaimCap {
    pub fn admits<I>(&self, claim_starts: I) -> bool
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let taken = claim_starts
            .into_iter()
            .filter(|start| self.window.contains_instant(*start))
            .count();
        taken < self.cap as usize
    }
}

/// Everything one allocation writes, committed as a unit. The store only
/// accepts it while an active shift of the technician at the appointment's
/// location covers `technician_occupancy` and every cap still admits it.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub appointment: Appointment,
    pub technician_occupancy: Occupancy,
    pub resource_occupancy: Occupancy,
    pub claim_caps: Vec<ClaimCap>,
}
