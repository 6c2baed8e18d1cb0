use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::{Appointment, AppointmentStatus};
use shared_utils::AppState;

use crate::models::AppointmentError;

pub struct AppointmentLifecycleService {
    store: Arc<dyn SchedulingStore>,
}

impl AppointmentLifecycleService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    /// Completed and cancelled are terminal.
    pub fn valid_transitions(current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Confirmed => &[AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => &[],
        }
    }

    pub fn validate_status_transition(
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !Self::valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    pub async fn complete_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    /// Releases the technician and resource claims along with the status
    /// change.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let cancelled = self.transition(appointment_id, AppointmentStatus::Cancelled).await?;
        info!("Appointment {} cancelled by {}", appointment_id, actor);
        Ok(cancelled)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        Self::validate_status_transition(current.status, new_status)?;

        let updated = self
            .store
            .update_appointment_status(appointment_id, current.status, new_status)
            .await?;
        info!("Appointment {} moved {} -> {}", appointment_id, current.status, new_status);
        Ok(updated)
    }
}
