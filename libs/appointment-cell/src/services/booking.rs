use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{SchedulingStore, ShiftFilter};
use shared_models::{Appointment, AppointmentStatus, NewBooking, Occupancy, Shift, Technician};
use shared_utils::{AppState, BusinessCalendar, Clock};
use technician_cell::PolicyResolver;

use crate::models::AppointmentError;
use crate::services::availability::{load_services, sorted_resources};
use crate::services::conflict::OccupancyIndex;
use crate::services::matcher::{rank_candidates, SlotMatcher};
use crate::services::plan::ServicePlan;

/// Allocates a technician and a resource for one concrete start and commits
/// the appointment with both claims as a unit.
pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
    default_step_minutes: i64,
}

impl AppointmentBookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            calendar: state.calendar,
            clock: state.clock.clone(),
            default_step_minutes: state.config.scheduling.default_slot_interval_minutes,
        }
    }

    pub async fn create_appointment(
        &self,
        customer_id: Uuid,
        service_id: Uuid,
        location_id: Uuid,
        start: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Allocating service {} at location {} for customer {} starting {}",
            service_id, location_id, customer_id, start
        );

        if self.store.get_location(location_id).await?.is_none() {
            return Err(AppointmentError::LocationNotFound(location_id));
        }
        let services = load_services(self.store.as_ref(), &[service_id]).await?;
        let plan = ServicePlan::new(&services, self.default_step_minutes)?;
        let technician_window = plan.technician_window(start);
        let resource_window = plan.resource_window(start);

        let capable = self.store.technicians_capable_of(&plan.service_ids).await?;
        let shifts = self
            .store
            .find_shifts(&ShiftFilter::active_for(
                capable.iter().map(|t| t.id).collect(),
                Some(location_id),
                technician_window,
            ))
            .await?;
        let covering: Vec<&Shift> = shifts
            .iter()
            .filter(|s| s.window().covers(&technician_window))
            .collect();
        let scheduled: Vec<Technician> = capable
            .into_iter()
            .filter(|t| covering.iter().any(|s| s.technician_id == t.id))
            .collect();
        if scheduled.is_empty() {
            warn!("No technician on shift at {} for {}", location_id, start);
            return Err(AppointmentError::NoTechnicianScheduled { start });
        }

        let technician_ids: Vec<Uuid> = scheduled.iter().map(|t| t.id).collect();
        let policies = PolicyResolver::new(self.store.clone())
            .resolve_policies(&technician_ids, Some(location_id))
            .await?;
        let candidates = rank_candidates(scheduled, &policies, &shifts);

        let resources = sorted_resources(
            self.store
                .resources_capable_of(location_id, &plan.service_ids)
                .await?,
        );
        let resource_ids: Vec<Uuid> = resources.iter().map(|r| r.id).collect();

        // Whole local day so quota counts see every claim.
        let span = self
            .calendar
            .day_window(self.calendar.local_date(start))
            .union(&technician_window)
            .union(&resource_window);
        let index = OccupancyIndex::new(
            self.store.technician_occupancies(&technician_ids, span).await?,
            self.store.resource_occupancies(&resource_ids, span).await?,
        );

        let matcher = SlotMatcher {
            plan: &plan,
            calendar: &self.calendar,
            candidates: &candidates,
            resources: &resources,
            index: &index,
        };

        let technician = matcher
            .technician_for(start)
            .ok_or(AppointmentError::TechniciansExhausted { start })?;
        let resource = matcher
            .resource_for(start)
            .ok_or(AppointmentError::NoResourceAvailable { start })?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            customer_id,
            service_id,
            location_id,
            technician_id: technician.technician.id,
            resource_id: resource.id,
            start_time: start,
            status: AppointmentStatus::Confirmed,
            created_at: self.clock.now(),
        };
        let booking = NewBooking {
            technician_occupancy: Occupancy::new(
                appointment.id,
                appointment.technician_id,
                technician_window,
            ),
            resource_occupancy: Occupancy::new(appointment.id, appointment.resource_id, resource_window),
            appointment,
            claim_caps: matcher.claim_caps(technician, start),
        };

        let committed = self.store.commit_appointment(booking).await.map_err(|e| {
            warn!("Commit for {} lost to a concurrent write: {}", start, e);
            AppointmentError::from(e)
        })?;

        info!(
            "Appointment {} confirmed with technician {} in resource {} at {}",
            committed.id, technician.technician.nickname, resource.name, start
        );
        Ok(committed)
    }
}
