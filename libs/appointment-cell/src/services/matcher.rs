use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{ClaimCap, Resource, Shift, Technician, TimeWindow};
use shared_utils::BusinessCalendar;
use technician_cell::services::technician::sort_by_priority;
use technician_cell::ResolvedPolicy;

use crate::services::conflict::OccupancyIndex;
use crate::services::plan::ServicePlan;

/// A capable technician with the policy and shifts that apply at one
/// location.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub technician: Technician,
    pub policy: ResolvedPolicy,
    pub shifts: Vec<TimeWindow>,
}

impl Candidate {
    pub fn covers(&self, window: &TimeWindow) -> bool {
        self.shifts.iter().any(|shift| shift.covers(window))
    }
}

/// Builds candidates in assignment order. Technicians without a policy
/// entry get the defaults.
pub fn rank_candidates(
    technicians: Vec<Technician>,
    policies: &HashMap<Uuid, ResolvedPolicy>,
    shifts: &[Shift],
) -> Vec<Candidate> {
    let mut ranked: Vec<(Technician, ResolvedPolicy)> = technicians
        .into_iter()
        .map(|t| {
            let policy = policies.get(&t.id).copied().unwrap_or_default();
            (t, policy)
        })
        .collect();
    sort_by_priority(&mut ranked);

    ranked
        .into_iter()
        .map(|(technician, policy)| {
            let shifts = shifts
                .iter()
                .filter(|s| s.technician_id == technician.id && s.is_active())
                .map(Shift::window)
                .collect();
            Candidate {
                technician,
                policy,
                shifts,
            }
        })
        .collect()
}

/// Deterministic first-eligible scan over ranked technicians and resources
/// for one start instant. Existence checks only; nothing is reserved.
pub struct SlotMatcher<'a> {
    pub plan: &'a ServicePlan,
    pub calendar: &'a BusinessCalendar,
    pub candidates: &'a [Candidate],
    pub resources: &'a [Resource],
    pub index: &'a OccupancyIndex,
}

impl<'a> SlotMatcher<'a> {
    /// The candidate's caps that apply to a claim starting at `start`: the
    /// daily cap over the local day and the period cap over the start's
    /// period. Committing the booking re-counts the same caps.
    pub fn claim_caps(&self, candidate: &Candidate, start: DateTime<Utc>) -> Vec<ClaimCap> {
        let policy = &candidate.policy;
        let date = self.calendar.local_date(start);
        let mut caps = Vec::new();

        if let Some(cap) = policy.max_daily_online {
            caps.push(ClaimCap { window: self.calendar.day_window(date), cap });
        }
        if let Some(period) = self.calendar.period_for_instant(start) {
            if let (Some(cap), Ok(window)) = (policy.period_cap(period), self.calendar.period_window(date, period)) {
                caps.push(ClaimCap { window, cap });
            }
        }
        caps
    }

    /// Claims on the start's local day, and in its period, must both stay
    /// strictly below the configured caps.
    pub fn within_quota(&self, candidate: &Candidate, start: DateTime<Utc>) -> bool {
        let claims = self.index.technician_claims(candidate.technician.id);
        self.claim_caps(candidate, start)
            .iter()
            .all(|cap| cap.admits(claims.iter().map(|claim| claim.start)))
    }

    pub fn technician_for(&self, start: DateTime<Utc>) -> Option<&'a Candidate> {
        let window = self.plan.technician_window(start);
        self.candidates.iter().find(|candidate| {
            candidate.policy.allow_public_booking
                && self.within_quota(candidate, start)
                && candidate.covers(&window)
                && self.index.technician_free(candidate.technician.id, &window)
        })
    }

    pub fn resource_for(&self, start: DateTime<Utc>) -> Option<&'a Resource> {
        let window = self.plan.resource_window(start);
        self.resources
            .iter()
            .find(|resource| self.index.resource_free(resource.id, &window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use shared_config::SchedulingConfig;
    use shared_models::{Occupancy, Service};

    fn calendar() -> BusinessCalendar {
        BusinessCalendar::new(&SchedulingConfig::default())
    }

    fn local(hour: u32, minute: u32) -> DateTime<Utc> {
        calendar().at(
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        )
    }

    fn plan() -> ServicePlan {
        let service = Service {
            id: Uuid::new_v4(),
            name: "Massage".to_string(),
            technician_duration: 60,
            room_duration: 60,
            buffer_time: 0,
            slot_interval_minutes: None,
        };
        ServicePlan::new(&[service], 60).unwrap()
    }

    fn candidate(nickname: &str, policy: ResolvedPolicy) -> Candidate {
        Candidate {
            technician: Technician {
                id: Uuid::new_v4(),
                nickname: nickname.to_string(),
                service_ids: Vec::new(),
            },
            policy,
            shifts: vec![TimeWindow::new(local(8, 30), local(12, 30))],
        }
    }

    #[test]
    fn test_ranking_uses_priority_then_nickname() {
        let a = Technician { id: Uuid::new_v4(), nickname: "Zoe".to_string(), service_ids: Vec::new() };
        let b = Technician { id: Uuid::new_v4(), nickname: "Amy".to_string(), service_ids: Vec::new() };
        let c = Technician { id: Uuid::new_v4(), nickname: "Bea".to_string(), service_ids: Vec::new() };
        let mut policies = HashMap::new();
        policies.insert(a.id, ResolvedPolicy { auto_assign_priority: 10, ..ResolvedPolicy::default() });

        let ranked = rank_candidates(vec![b.clone(), c.clone(), a.clone()], &policies, &[]);
        let order: Vec<&str> = ranked.iter().map(|c| c.technician.nickname.as_str()).collect();
        assert_eq!(order, vec!["Zoe", "Amy", "Bea"]);
    }

    #[test]
    fn test_morning_cap_counts_existing_claims() {
        let capped = candidate(
            "Amy",
            ResolvedPolicy { max_morning_online: Some(1), ..ResolvedPolicy::default() },
        );
        let booked = Occupancy::new(
            Uuid::new_v4(),
            capped.technician.id,
            TimeWindow::starting_at(local(8, 30), Duration::minutes(60)),
        );
        let index = OccupancyIndex::new(vec![booked], Vec::new());
        let plan = plan();
        let calendar = calendar();
        let candidates = vec![capped];
        let matcher = SlotMatcher {
            plan: &plan,
            calendar: &calendar,
            candidates: &candidates,
            resources: &[],
            index: &index,
        };

        assert!(!matcher.within_quota(&candidates[0], local(10, 30)));
        assert!(matcher.technician_for(local(10, 30)).is_none());
        // Afternoon is a separate bucket.
        assert!(matcher.within_quota(&candidates[0], local(14, 0)));
    }

    #[test]
    fn test_claim_caps_follow_the_resolved_policy() {
        let capped = candidate(
            "Amy",
            ResolvedPolicy {
                max_daily_online: Some(3),
                max_afternoon_online: Some(1),
                ..ResolvedPolicy::default()
            },
        );
        let index = OccupancyIndex::default();
        let plan = plan();
        let calendar = calendar();
        let candidates = vec![capped];
        let matcher = SlotMatcher {
            plan: &plan,
            calendar: &calendar,
            candidates: &candidates,
            resources: &[],
            index: &index,
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();

        let morning = matcher.claim_caps(&candidates[0], local(9, 30));
        assert_eq!(morning, vec![ClaimCap { window: calendar.day_window(date), cap: 3 }]);

        let afternoon = matcher.claim_caps(&candidates[0], local(14, 0));
        assert_eq!(afternoon.len(), 2);
        assert_eq!(
            afternoon[1],
            ClaimCap { window: calendar.period_window(date, shared_models::Period::Afternoon).unwrap(), cap: 1 }
        );

        let uncapped = candidate("Bea", ResolvedPolicy::default());
        assert!(matcher.claim_caps(&uncapped, local(9, 30)).is_empty());
    }

    #[test]
    fn test_first_eligible_technician_wins() {
        let hidden = candidate(
            "Amy",
            ResolvedPolicy { allow_public_booking: false, ..ResolvedPolicy::default() },
        );
        let open = candidate("Bea", ResolvedPolicy::default());
        let index = OccupancyIndex::default();
        let plan = plan();
        let calendar = calendar();
        let candidates = vec![hidden, open];
        let matcher = SlotMatcher {
            plan: &plan,
            calendar: &calendar,
            candidates: &candidates,
            resources: &[],
            index: &index,
        };

        let chosen = matcher.technician_for(local(9, 30)).unwrap();
        assert_eq!(chosen.technician.nickname, "Bea");
        assert!(matcher.technician_for(local(12, 0)).is_none());
        assert!(matcher.resource_for(local(9, 30)).is_none());
    }
}
