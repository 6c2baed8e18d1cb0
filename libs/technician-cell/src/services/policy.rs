use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use shared_database::{SchedulingStore, StoreResult};
use shared_models::{Period, TechnicianPolicy, DEFAULT_AUTO_ASSIGN_PRIORITY};

/// The policy that applies to one technician at one location after
/// precedence has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub max_daily_online: Option<u32>,
    pub max_morning_online: Option<u32>,
    pub max_afternoon_online: Option<u32>,
    pub auto_assign_priority: i32,
    pub allow_public_booking: bool,
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        Self {
            max_daily_online: None,
            max_morning_online: None,
            max_afternoon_online: None,
            auto_assign_priority: DEFAULT_AUTO_ASSIGN_PRIORITY,
            allow_public_booking: true,
        }
    }
}

impl From<&TechnicianPolicy> for ResolvedPolicy {
    fn from(row: &TechnicianPolicy) -> Self {
        Self {
            max_daily_online: row.max_daily_online,
            max_morning_online: row.max_morning_online,
            max_afternoon_online: row.max_afternoon_online,
            auto_assign_priority: row.auto_assign_priority,
            allow_public_booking: row.allow_public_booking,
        }
    }
}

impl ResolvedPolicy {
    /// Cap for the period bucket, or `None` when uncapped.
    pub fn period_cap(&self, period: Period) -> Option<u32> {
        match period {
            Period::Morning => self.max_morning_online,
            Period::Afternoon => self.max_afternoon_online,
        }
    }
}

/// Location-scoped row beats the global row; no row at all means defaults.
pub fn apply_precedence(
    technician_ids: &[Uuid],
    location_id: Option<Uuid>,
    rows: &[TechnicianPolicy],
) -> HashMap<Uuid, ResolvedPolicy> {
    technician_ids
        .iter()
        .map(|technician_id| {
            let mine = || rows.iter().filter(move |r| r.technician_id == *technician_id);
            let scoped = location_id.and_then(|loc| mine().find(|r| r.location_id == Some(loc)));
            let global = mine().find(|r| r.location_id.is_none());

            let policy = scoped
                .or(global)
                .map(ResolvedPolicy::from)
                .unwrap_or_default();
            (*technician_id, policy)
        })
        .collect()
}

pub struct PolicyResolver {
    store: Arc<dyn SchedulingStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// One entry per requested technician, defaults included.
    pub async fn resolve_policies(
        &self,
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<HashMap<Uuid, ResolvedPolicy>> {
        if technician_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.store.technician_policies(technician_ids, location_id).await?;
        debug!(
            "Resolving policies for {} technicians from {} rows",
            technician_ids.len(),
            rows.len()
        );

        Ok(apply_precedence(technician_ids, location_id, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(technician_id: Uuid, location_id: Option<Uuid>, priority: i32) -> TechnicianPolicy {
        TechnicianPolicy {
            technician_id,
            location_id,
            max_daily_online: None,
            max_morning_online: None,
            max_afternoon_online: None,
            auto_assign_priority: priority,
            allow_public_booking: true,
        }
    }

    #[test]
    fn test_location_row_wins_over_global() {
        let tech = Uuid::new_v4();
        let loc = Uuid::new_v4();
        let rows = vec![row(tech, None, 70), row(tech, Some(loc), 20)];

        let resolved = apply_precedence(&[tech], Some(loc), &rows);
        assert_eq!(resolved[&tech].auto_assign_priority, 20);

        let elsewhere = apply_precedence(&[tech], Some(Uuid::new_v4()), &rows);
        assert_eq!(elsewhere[&tech].auto_assign_priority, 70);
    }

    #[test]
    fn test_missing_policy_falls_back_to_defaults() {
        let tech = Uuid::new_v4();
        let resolved = apply_precedence(&[tech], None, &[]);
        assert_eq!(resolved[&tech], ResolvedPolicy::default());
        assert!(resolved[&tech].allow_public_booking);
        assert_eq!(resolved[&tech].period_cap(Period::Morning), None);
    }

    #[test]
    fn test_period_cap_selects_bucket() {
        let policy = ResolvedPolicy {
            max_morning_online: Some(1),
            max_afternoon_online: Some(3),
            ..ResolvedPolicy::default()
        };
        assert_eq!(policy.period_cap(Period::Morning), Some(1));
        assert_eq!(policy.period_cap(Period::Afternoon), Some(3));
    }
}
