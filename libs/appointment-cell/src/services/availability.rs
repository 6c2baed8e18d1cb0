use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_database::{SchedulingStore, ShiftFilter};
use shared_models::{Resource, Service, Technician, TimeWindow};
use shared_utils::{AppState, BusinessCalendar};
use technician_cell::{PolicyResolver, PricingResolver};

use crate::models::{AppointmentError, Hold, PackageAvailabilityRequest, PackageSlot};
use crate::services::conflict::OccupancyIndex;
use crate::services::matcher::{rank_candidates, SlotMatcher};
use crate::services::plan::ServicePlan;

/// A start instant with the representative technician and the first free
/// resource that make it bookable.
#[derive(Debug, Clone)]
pub struct AvailableSlot {
    pub start: DateTime<Utc>,
    pub technician_window: TimeWindow,
    pub resource_window: TimeWindow,
    pub technician: Technician,
    pub resource: Resource,
}

pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    calendar: BusinessCalendar,
    default_step_minutes: i64,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            calendar: state.calendar,
            default_step_minutes: state.config.scheduling.default_slot_interval_minutes,
        }
    }

    /// Bookable starts on `date` for one service, as business-local `HH:MM`.
    pub async fn get_available_slots(
        &self,
        location_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<String>, AppointmentError> {
        let request = PackageAvailabilityRequest {
            location_id,
            target_date: date,
            ordered_service_ids: vec![service_id],
            preferred_technician_id: None,
            holds: Vec::new(),
        };

        let slots = self.compute_available_slots(&request).await?;
        Ok(slots
            .iter()
            .map(|slot| self.calendar.format_hhmm(slot.start))
            .collect())
    }

    /// Bookable starts for a bundle, each pinned to a technician and a
    /// resource. The price is attached only when every service in the bundle
    /// resolves one for the representative technician.
    pub async fn get_package_availability(
        &self,
        request: &PackageAvailabilityRequest,
    ) -> Result<Vec<PackageSlot>, AppointmentError> {
        let slots = self.compute_available_slots(request).await?;
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let technician_ids: Vec<Uuid> = slots
            .iter()
            .map(|s| s.technician.id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let prices = PricingResolver::new(self.store.clone())
            .resolve_pricing(
                &request.ordered_service_ids,
                &technician_ids,
                Some(request.location_id),
            )
            .await?;

        Ok(slots
            .into_iter()
            .map(|slot| PackageSlot {
                start_time: slot.start,
                technician_end_time: slot.technician_window.end,
                resource_end_time: slot.resource_window.end,
                price: prices.total_price(
                    &request.ordered_service_ids,
                    Some(slot.technician.id),
                    Some(request.location_id),
                ),
                technician_id: slot.technician.id,
                technician_nickname: slot.technician.nickname,
                resource_id: slot.resource.id,
                resource_name: slot.resource.name,
            })
            .collect())
    }

    /// Scans every candidate start on the target day in ascending order.
    /// No capable technician or resource is an empty answer, not an error.
    pub async fn compute_available_slots(
        &self,
        request: &PackageAvailabilityRequest,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        debug!(
            "Computing availability at {} on {} for {} services",
            request.location_id,
            request.target_date,
            request.ordered_service_ids.len()
        );

        if self.store.get_location(request.location_id).await?.is_none() {
            return Err(AppointmentError::LocationNotFound(request.location_id));
        }
        let services = load_services(self.store.as_ref(), &request.ordered_service_ids).await?;
        validate_holds(&request.holds)?;

        let plan = ServicePlan::new(&services, self.default_step_minutes)?;
        let capability: Vec<Uuid> = distinct(&plan.service_ids);

        let technicians = self.store.technicians_capable_of(&capability).await?;
        let resources = sorted_resources(
            self.store
                .resources_capable_of(request.location_id, &capability)
                .await?,
        );
        if technicians.is_empty() || resources.is_empty() {
            debug!(
                "No capable technicians ({}) or resources ({})",
                technicians.len(),
                resources.len()
            );
            return Ok(Vec::new());
        }

        let day = self.calendar.day_window(request.target_date);
        let shifts = self
            .store
            .find_shifts(&ShiftFilter::active_for(
                technicians.iter().map(|t| t.id).collect(),
                Some(request.location_id),
                day,
            ))
            .await?;
        let scheduled: HashSet<Uuid> = shifts.iter().map(|s| s.technician_id).collect();

        let technicians: Vec<Technician> = match request.preferred_technician_id {
            Some(preferred) if !scheduled.contains(&preferred) => {
                debug!("Preferred technician {} is not capable and scheduled", preferred);
                return Ok(Vec::new());
            }
            Some(preferred) => technicians.into_iter().filter(|t| t.id == preferred).collect(),
            None => technicians
                .into_iter()
                .filter(|t| scheduled.contains(&t.id))
                .collect(),
        };
        let technician_ids: Vec<Uuid> = technicians.iter().map(|t| t.id).collect();

        let starts: BTreeSet<DateTime<Utc>> = shifts
            .iter()
            .filter(|s| technician_ids.contains(&s.technician_id))
            .flat_map(|s| plan.candidate_starts(&s.window()))
            .filter(|start| day.contains_instant(*start))
            .collect();
        let (Some(first), Some(last)) = (starts.first(), starts.last()) else {
            return Ok(Vec::new());
        };
        let span = day.union(&TimeWindow::new(*first, *last + plan.longest()));

        let policies = PolicyResolver::new(self.store.clone())
            .resolve_policies(&technician_ids, Some(request.location_id))
            .await?;
        let candidates = rank_candidates(technicians, &policies, &shifts);

        let resource_ids: Vec<Uuid> = resources.iter().map(|r| r.id).collect();
        let mut index = OccupancyIndex::new(
            self.store.technician_occupancies(&technician_ids, span).await?,
            self.store.resource_occupancies(&resource_ids, span).await?,
        );
        index.add_holds(&request.holds);

        let matcher = SlotMatcher {
            plan: &plan,
            calendar: &self.calendar,
            candidates: &candidates,
            resources: &resources,
            index: &index,
        };

        let slots: Vec<AvailableSlot> = starts
            .into_iter()
            .filter_map(|start| {
                let candidate = matcher.technician_for(start)?;
                let resource = matcher.resource_for(start)?;
                Some(AvailableSlot {
                    start,
                    technician_window: plan.technician_window(start),
                    resource_window: plan.resource_window(start),
                    technician: candidate.technician.clone(),
                    resource: resource.clone(),
                })
            })
            .collect();

        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }
}

/// Services in request order. Any unknown id fails the whole request.
pub(crate) async fn load_services(
    store: &dyn SchedulingStore,
    service_ids: &[Uuid],
) -> Result<Vec<Service>, AppointmentError> {
    if service_ids.is_empty() {
        return Err(AppointmentError::InvalidInput(
            "At least one service is required".to_string(),
        ));
    }

    let found = store.get_services(&distinct(service_ids)).await?;
    service_ids
        .iter()
        .map(|id| {
            found
                .get(id)
                .cloned()
                .ok_or(AppointmentError::ServiceNotFound(*id))
        })
        .collect()
}

/// Resources have no priority; name then id keeps the pick stable.
pub(crate) fn sorted_resources(mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    resources
}

fn validate_holds(holds: &[Hold]) -> Result<(), AppointmentError> {
    match holds.iter().find(|h| h.end_time <= h.start_time) {
        Some(hold) => Err(AppointmentError::InvalidInput(format!(
            "Hold ending at {} does not end after its start {}",
            hold.end_time, hold.start_time
        ))),
        None => Ok(()),
    }
}

fn distinct(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
