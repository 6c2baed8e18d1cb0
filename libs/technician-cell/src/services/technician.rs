use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::Technician;

use crate::error::ShiftError;
use crate::models::{ServiceOption, TechnicianOption};
use crate::services::policy::{PolicyResolver, ResolvedPolicy};

/// Deterministic assignment order: priority, then nickname, then id.
pub fn sort_by_priority(candidates: &mut [(Technician, ResolvedPolicy)]) {
    candidates.sort_by(|(a, pa), (b, pb)| {
        pa.auto_assign_priority
            .cmp(&pb.auto_assign_priority)
            .then_with(|| a.nickname.cmp(&b.nickname))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub struct TechnicianDirectory {
    store: Arc<dyn SchedulingStore>,
}

impl TechnicianDirectory {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// Services at least one resource at the location can host.
    pub async fn list_services_for_location(
        &self,
        location_id: Uuid,
    ) -> Result<Vec<ServiceOption>, ShiftError> {
        if self.store.get_location(location_id).await?.is_none() {
            return Err(ShiftError::NotFound { entity: "location", id: location_id });
        }

        let services = self.store.services_at_location(location_id).await?;
        debug!("Location {} hosts {} services", location_id, services.len());
        Ok(services.into_iter().map(ServiceOption::from).collect())
    }

    /// Publicly bookable technicians able to perform every service, in the
    /// order the allocator would try them.
    pub async fn list_for_services(
        &self,
        location_id: Uuid,
        service_ids: &[Uuid],
    ) -> Result<Vec<TechnicianOption>, ShiftError> {
        debug!(
            "Listing technicians at {} for {} services",
            location_id,
            service_ids.len()
        );

        if self.store.get_location(location_id).await?.is_none() {
            return Err(ShiftError::NotFound { entity: "location", id: location_id });
        }
        if service_ids.is_empty() {
            return Ok(Vec::new());
        }

        let technicians = self.store.technicians_capable_of(service_ids).await?;
        let ids: Vec<Uuid> = technicians.iter().map(|t| t.id).collect();
        let policies = PolicyResolver::new(self.store.clone())
            .resolve_policies(&ids, Some(location_id))
            .await?;

        let mut candidates: Vec<(Technician, ResolvedPolicy)> = technicians
            .into_iter()
            .filter_map(|t| {
                let policy = policies.get(&t.id).copied().unwrap_or_default();
                policy.allow_public_booking.then_some((t, policy))
            })
            .collect();
        sort_by_priority(&mut candidates);

        Ok(candidates
            .into_iter()
            .map(|(t, policy)| TechnicianOption {
                id: t.id,
                nickname: t.nickname,
                auto_assign_priority: policy.auto_assign_priority,
            })
            .collect())
    }
}
