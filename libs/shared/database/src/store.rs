use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, Location, NewBooking, Occupancy, PricingRule, Resource,
    Service, Shift, Technician, TechnicianPolicy, TimeWindow,
};

use crate::error::StoreResult;

#[derive(Debug, Clone, Default)]
pub struct ShiftFilter {
    pub technician_ids: Option<Vec<Uuid>>,
    pub location_id: Option<Uuid>,
    /// Keep shifts intersecting this window.
    pub window: Option<TimeWindow>,
    pub include_cancelled: bool,
}

impl ShiftFilter {
    pub fn active_for(technician_ids: Vec<Uuid>, location_id: Option<Uuid>, window: TimeWindow) -> Self {
        Self {
            technician_ids: Some(technician_ids),
            location_id,
            window: Some(window),
            include_cancelled: false,
        }
    }

    pub fn matches(&self, shift: &Shift) -> bool {
        if !self.include_cancelled && shift.is_cancelled {
            return false;
        }
        if let Some(ids) = &self.technician_ids {
            if !ids.contains(&shift.technician_id) {
                return false;
            }
        }
        if let Some(location_id) = self.location_id {
            if shift.location_id != location_id {
                return false;
            }
        }
        match &self.window {
            Some(window) => shift.window().overlaps(window),
            None => true,
        }
    }
}

/// Transactional relational store behind the scheduling engines.
///
/// Reads are batch fetches returning flat rows. Every method is one unit of
/// work: reads see a consistent snapshot, and writes re-check the overlap
/// invariants themselves so that two requests racing through the same
/// read-then-decide window can never both commit.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>>;

    /// All locations, ordered by name.
    async fn list_locations(&self) -> StoreResult<Vec<Location>>;

    async fn get_services(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Service>>;

    /// Services hosted by at least one resource at `location_id`, ordered by
    /// name.
    async fn services_at_location(&self, location_id: Uuid) -> StoreResult<Vec<Service>>;

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>>;

    /// Technicians capable of every one of `service_ids`.
    async fn technicians_capable_of(&self, service_ids: &[Uuid]) -> StoreResult<Vec<Technician>>;

    /// Resources at `location_id` capable of every one of `service_ids`.
    async fn resources_capable_of(
        &self,
        location_id: Uuid,
        service_ids: &[Uuid],
    ) -> StoreResult<Vec<Resource>>;

    async fn get_shift(&self, id: Uuid) -> StoreResult<Option<Shift>>;

    /// Shifts matching `filter`, ordered by start time.
    async fn find_shifts(&self, filter: &ShiftFilter) -> StoreResult<Vec<Shift>>;

    /// Fails with `OverlapViolation` if the technician already has a
    /// non-cancelled shift overlapping the new one.
    async fn insert_shift(&self, shift: Shift) -> StoreResult<Shift>;

    /// Marks a shift cancelled. Fails with `Conflict` while any non-cancelled
    /// appointment still occupies the technician inside the shift window.
    /// Already-cancelled shifts are returned unchanged.
    async fn cancel_shift(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> StoreResult<Shift>;

    /// Global rows plus rows scoped to `location_id` for the given technicians.
    async fn technician_policies(
        &self,
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<TechnicianPolicy>>;

    /// Active rules for `service_ids` whose technician and location are each
    /// either one of the requested values or null.
    async fn pricing_rules(
        &self,
        service_ids: &[Uuid],
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<PricingRule>>;

    async fn technician_occupancies(
        &self,
        technician_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<Occupancy>>;

    async fn resource_occupancies(
        &self,
        resource_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<Occupancy>>;

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Writes the appointment and both occupancy rows, or nothing. Shift
    /// coverage, both ledgers and the booking's claim caps are re-checked in
    /// the same write; a lapsed shift or a reached cap is a `Conflict`.
    async fn commit_appointment(&self, booking: NewBooking) -> StoreResult<Appointment>;

    /// Sets the status only while it is still `expected`, otherwise
    /// `Conflict`. Moving to `Cancelled` voids the appointment's occupancy
    /// rows in the same write.
    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment>;
}
