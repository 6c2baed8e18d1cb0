use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, Location, NewBooking, Occupancy, PricingRule, Resource,
    Service, Shift, Technician, TechnicianPolicy, TimeWindow,
};

use crate::error::{StoreError, StoreResult};
use crate::ledger::Ledger;
use crate::store::{SchedulingStore, ShiftFilter};

/// Catalog and configuration rows the store starts from. This is the whole
/// admin data-entry surface of the in-memory backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub locations: Vec<Location>,
    pub services: Vec<Service>,
    pub technicians: Vec<Technician>,
    pub resources: Vec<Resource>,
    pub policies: Vec<TechnicianPolicy>,
    pub pricing_rules: Vec<PricingRule>,
    pub shifts: Vec<Shift>,
}

struct Tables {
    locations: HashMap<Uuid, Location>,
    services: HashMap<Uuid, Service>,
    technicians: HashMap<Uuid, Technician>,
    resources: HashMap<Uuid, Resource>,
    policies: HashMap<(Uuid, Option<Uuid>), TechnicianPolicy>,
    pricing_rules: HashMap<Uuid, PricingRule>,
    shifts: HashMap<Uuid, Shift>,
    appointments: HashMap<Uuid, Appointment>,
    technician_ledger: Ledger,
    resource_ledger: Ledger,
}

impl Tables {
    fn empty() -> Self {
        Self {
            locations: HashMap::new(),
            services: HashMap::new(),
            technicians: HashMap::new(),
            resources: HashMap::new(),
            policies: HashMap::new(),
            pricing_rules: HashMap::new(),
            shifts: HashMap::new(),
            appointments: HashMap::new(),
            technician_ledger: Ledger::new("technician"),
            resource_ledger: Ledger::new("resource"),
        }
    }

    fn overlapping_active_shift(&self, shift: &Shift) -> Option<&Shift> {
        let window = shift.window();
        self.shifts.values().find(|existing| {
            existing.id != shift.id
                && existing.technician_id == shift.technician_id
                && existing.is_active()
                && existing.window().overlaps(&window)
        })
    }

    fn covering_active_shift(&self, appointment: &Appointment, window: &TimeWindow) -> Option<&Shift> {
        self.shifts.values().find(|shift| {
            shift.technician_id == appointment.technician_id
                && shift.location_id == appointment.location_id
                && shift.is_active()
                && shift.window().covers(window)
        })
    }
}

/// Single-lock store: reads share the lock, writes take it exclusively and
/// re-validate before mutating, so conflicting writers are serialized.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::empty()),
        }
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let mut tables = Tables::empty();

        for location in seed.locations {
            tables.locations.insert(location.id, location);
        }
        for service in seed.services {
            tables.services.insert(service.id, service);
        }
        for technician in seed.technicians {
            tables.technicians.insert(technician.id, technician);
        }
        for resource in seed.resources {
            tables.resources.insert(resource.id, resource);
        }
        for policy in seed.policies {
            tables
                .policies
                .insert((policy.technician_id, policy.location_id), policy);
        }
        for rule in seed.pricing_rules {
            tables.pricing_rules.insert(rule.id, rule);
        }
        for shift in seed.shifts {
            if let Some(existing) = tables.overlapping_active_shift(&shift) {
                warn!(
                    "Skipping seeded shift {} overlapping shift {} of technician {}",
                    shift.id, existing.id, shift.technician_id
                );
                continue;
            }
            tables.shifts.insert(shift.id, shift);
        }

        info!(
            "In-memory store seeded: {} locations, {} services, {} technicians, {} resources",
            tables.locations.len(),
            tables.services.len(),
            tables.technicians.len(),
            tables.resources.len()
        );

        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn add_location(&self, location: Location) {
        self.tables.write().await.locations.insert(location.id, location);
    }

    pub async fn add_service(&self, service: Service) {
        self.tables.write().await.services.insert(service.id, service);
    }

    pub async fn add_technician(&self, technician: Technician) {
        self.tables.write().await.technicians.insert(technician.id, technician);
    }

    pub async fn add_resource(&self, resource: Resource) {
        self.tables.write().await.resources.insert(resource.id, resource);
    }

    pub async fn upsert_policy(&self, policy: TechnicianPolicy) {
        let mut tables = self.tables.write().await;
        tables
            .policies
            .insert((policy.technician_id, policy.location_id), policy);
    }

    pub async fn upsert_pricing_rule(&self, rule: PricingRule) {
        let mut tables = self.tables.write().await;
        tables.pricing_rules.insert(rule.id, rule);
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.read().await.appointments.len()
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn get_location(&self, id: Uuid) -> StoreResult<Option<Location>> {
        Ok(self.tables.read().await.locations.get(&id).cloned())
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let tables = self.tables.read().await;
        let mut locations: Vec<Location> = tables.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(locations)
    }

    async fn get_services(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Service>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.services.get(id).map(|s| (*id, s.clone())))
            .collect())
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>> {
        Ok(self.tables.read().await.technicians.get(&id).cloned())
    }

    async fn technicians_capable_of(&self, service_ids: &[Uuid]) -> StoreResult<Vec<Technician>> {
        let tables = self.tables.read().await;
        let mut technicians: Vec<Technician> = tables
            .technicians
            .values()
            .filter(|t| t.can_perform_all(service_ids))
            .cloned()
            .collect();
        technicians.sort_by_key(|t| t.id);
        Ok(technicians)
    }

    async fn services_at_location(&self, location_id: Uuid) -> StoreResult<Vec<Service>> {
        let tables = self.tables.read().await;
        let hosted: HashSet<Uuid> = tables
            .resources
            .values()
            .filter(|r| r.location_id == location_id)
            .flat_map(|r| r.service_ids.iter().copied())
            .collect();
        let mut services: Vec<Service> = hosted
            .iter()
            .filter_map(|id| tables.services.get(id).cloned())
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(services)
    }

    async fn resources_capable_of(
        &self,
        location_id: Uuid,
        service_ids: &[Uuid],
    ) -> StoreResult<Vec<Resource>> {
        let tables = self.tables.read().await;
        let mut resources: Vec<Resource> = tables
            .resources
            .values()
            .filter(|r| r.location_id == location_id && r.can_host_all(service_ids))
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(resources)
    }

    async fn get_shift(&self, id: Uuid) -> StoreResult<Option<Shift>> {
        Ok(self.tables.read().await.shifts.get(&id).cloned())
    }

    async fn find_shifts(&self, filter: &ShiftFilter) -> StoreResult<Vec<Shift>> {
        let tables = self.tables.read().await;
        let mut shifts: Vec<Shift> = tables
            .shifts
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        shifts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(shifts)
    }

    async fn insert_shift(&self, shift: Shift) -> StoreResult<Shift> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.overlapping_active_shift(&shift) {
            return Err(StoreError::OverlapViolation {
                owner_kind: "technician",
                owner_id: shift.technician_id,
                conflicting_id: existing.id,
            });
        }

        debug!(
            "Inserting shift {} for technician {} [{} - {})",
            shift.id, shift.technician_id, shift.start_time, shift.end_time
        );
        tables.shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn cancel_shift(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> StoreResult<Shift> {
        let mut tables = self.tables.write().await;

        let shift = tables
            .shifts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "shift", id })?;

        if shift.is_cancelled {
            return Ok(shift);
        }

        let booked = tables
            .technician_ledger
            .overlapping(&shift.technician_id, shift.window())
            .find(|o| {
                tables
                    .appointments
                    .get(&o.appointment_id)
                    .is_some_and(|a| a.status != AppointmentStatus::Cancelled)
            })
            .map(|o| o.appointment_id);

        if let Some(appointment_id) = booked {
            return Err(StoreError::Conflict(format!(
                "shift {} still has appointment {} booked inside it",
                id, appointment_id
            )));
        }

        let updated = Shift {
            is_cancelled: true,
            cancelled_by: Some(actor),
            cancelled_at: Some(at),
            ..shift
        };
        tables.shifts.insert(id, updated.clone());
        Ok(updated)
    }

    async fn technician_policies(
        &self,
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<TechnicianPolicy>> {
        let tables = self.tables.read().await;
        Ok(tables
            .policies
            .values()
            .filter(|p| technician_ids.contains(&p.technician_id))
            .filter(|p| p.location_id.is_none() || (location_id.is_some() && p.location_id == location_id))
            .cloned()
            .collect())
    }

    async fn pricing_rules(
        &self,
        service_ids: &[Uuid],
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<Vec<PricingRule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pricing_rules
            .values()
            .filter(|r| r.is_active && service_ids.contains(&r.service_id))
            .filter(|r| match r.technician_id {
                Some(technician_id) => technician_ids.contains(&technician_id),
                None => true,
            })
            .filter(|r| match r.location_id {
                Some(rule_location) => location_id == Some(rule_location),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn technician_occupancies(
        &self,
        technician_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<Occupancy>> {
        Ok(self.tables.read().await.technician_ledger.query(technician_ids, window))
    }

    async fn resource_occupancies(
        &self,
        resource_ids: &[Uuid],
        window: TimeWindow,
    ) -> StoreResult<Vec<Occupancy>> {
        Ok(self.tables.read().await.resource_ledger.query(resource_ids, window))
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn commit_appointment(&self, booking: NewBooking) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;

        let technician_window = booking.technician_occupancy.window();
        if tables
            .covering_active_shift(&booking.appointment, &technician_window)
            .is_none()
        {
            return Err(StoreError::Conflict(format!(
                "technician {} has no active shift at location {} covering {}",
                booking.appointment.technician_id, booking.appointment.location_id, technician_window.start
            )));
        }

        let technician_id = booking.technician_occupancy.owner_id;
        for cap in &booking.claim_caps {
            let claim_starts = tables
                .technician_ledger
                .overlapping(&technician_id, cap.window)
                .map(|claim| claim.start_time);
            if !cap.admits(claim_starts) {
                return Err(StoreError::Conflict(format!(
                    "technician {} already has {} claims starting in {} - {}",
                    technician_id, cap.cap, cap.window.start, cap.window.end
                )));
            }
        }

        if let Err(conflicting_id) = tables.technician_ledger.check(&booking.technician_occupancy) {
            return Err(StoreError::OverlapViolation {
                owner_kind: tables.technician_ledger.kind(),
                owner_id: booking.technician_occupancy.owner_id,
                conflicting_id,
            });
        }
        if let Err(conflicting_id) = tables.resource_ledger.check(&booking.resource_occupancy) {
            return Err(StoreError::OverlapViolation {
                owner_kind: tables.resource_ledger.kind(),
                owner_id: booking.resource_occupancy.owner_id,
                conflicting_id,
            });
        }

        let appointment = booking.appointment;
        tables
            .technician_ledger
            .insert_unchecked(booking.technician_occupancy);
        tables
            .resource_ledger
            .insert_unchecked(booking.resource_occupancy);
        tables.appointments.insert(appointment.id, appointment.clone());

        Ok(appointment)
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;

        let appointment = tables
            .appointments
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "appointment", id })?;
        if appointment.status != expected {
            return Err(StoreError::Conflict(format!(
                "appointment {} is {}, not {}",
                id, appointment.status, expected
            )));
        }
        appointment.status = status;
        let updated = appointment.clone();

        if status == AppointmentStatus::Cancelled {
            let released = tables.technician_ledger.release_appointment(id)
                + tables.resource_ledger.release_appointment(id);
            debug!("Released {} occupancy rows of appointment {}", released, id);
        }

        Ok(updated)
    }
}
