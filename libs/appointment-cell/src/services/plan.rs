use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use shared_models::{Service, TimeWindow};

use crate::models::AppointmentError;

/// Combined time footprint of a single service or an ordered bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePlan {
    pub service_ids: Vec<Uuid>,
    pub technician_duration: Duration,
    pub resource_duration: Duration,
    pub step: Duration,
}

impl ServicePlan {
    /// The step is the smallest positive `slot_interval_minutes` in the
    /// bundle, else `default_step_minutes`. A zero total on either side is
    /// replaced by the step so no claim is ever empty.
    pub fn new(services: &[Service], default_step_minutes: i64) -> Result<Self, AppointmentError> {
        if services.is_empty() {
            return Err(AppointmentError::InvalidInput(
                "At least one service is required".to_string(),
            ));
        }

        let step_minutes = services
            .iter()
            .filter_map(|s| s.slot_interval_minutes)
            .filter(|minutes| *minutes > 0)
            .map(i64::from)
            .min()
            .unwrap_or(default_step_minutes)
            .max(1);
        let step = Duration::minutes(step_minutes);

        let technician_minutes: i64 = services
            .iter()
            .map(|s| i64::from(s.technician_duration + s.buffer_time).max(0))
            .sum();
        let resource_minutes: i64 = services
            .iter()
            .map(|s| i64::from(s.room_duration + s.buffer_time).max(0))
            .sum();

        let or_step = |minutes: i64| if minutes > 0 { Duration::minutes(minutes) } else { step };

        Ok(Self {
            service_ids: services.iter().map(|s| s.id).collect(),
            technician_duration: or_step(technician_minutes),
            resource_duration: or_step(resource_minutes),
            step,
        })
    }

    pub fn technician_window(&self, start: DateTime<Utc>) -> TimeWindow {
        TimeWindow::starting_at(start, self.technician_duration)
    }

    pub fn resource_window(&self, start: DateTime<Utc>) -> TimeWindow {
        TimeWindow::starting_at(start, self.resource_duration)
    }

    pub fn longest(&self) -> Duration {
        self.technician_duration.max(self.resource_duration)
    }

    /// Starts stepped from the shift start whose technician claim still
    /// ends inside the shift.
    pub fn candidate_starts(&self, shift: &TimeWindow) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        let mut start = shift.start;
        while start + self.technician_duration <= shift.end {
            starts.push(start);
            start += self.step;
        }
        starts
    }
}
