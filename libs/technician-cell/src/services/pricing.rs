use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use shared_database::{SchedulingStore, StoreResult};
use shared_models::PricingRule;

type PriceKey = (Uuid, Option<Uuid>, Option<Uuid>);

/// Active pricing rules keyed by (service, technician?, location?).
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<PriceKey, i64>,
}

impl PricingTable {
    pub fn from_rules(mut rules: Vec<PricingRule>) -> Self {
        // Duplicate keys resolve to the rule with the smallest id.
        rules.sort_by_key(|r| r.id);
        let mut prices = HashMap::new();
        for rule in rules.into_iter().filter(|r| r.is_active) {
            prices
                .entry((rule.service_id, rule.technician_id, rule.location_id))
                .or_insert(rule.price);
        }
        Self { prices }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Most specific match first: (s,t,l), (s,t,-), (s,-,l), (s,-,-).
    pub fn service_price(
        &self,
        service_id: Uuid,
        technician_id: Option<Uuid>,
        location_id: Option<Uuid>,
    ) -> Option<i64> {
        [
            (service_id, technician_id, location_id),
            (service_id, technician_id, None),
            (service_id, None, location_id),
            (service_id, None, None),
        ]
        .iter()
        .find_map(|key| self.prices.get(key).copied())
    }

    /// Sum over the bundle, or `None` if the bundle is empty, any service
    /// has no price, or the sum does not fit.
    pub fn total_price(
        &self,
        service_ids: &[Uuid],
        technician_id: Option<Uuid>,
        location_id: Option<Uuid>,
    ) -> Option<i64> {
        if service_ids.is_empty() {
            return None;
        }
        service_ids.iter().try_fold(0i64, |total, service_id| {
            self.service_price(*service_id, technician_id, location_id)
                .and_then(|price| total.checked_add(price))
        })
    }
}

pub struct PricingResolver {
    store: Arc<dyn SchedulingStore>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// Loads only rules that could match the request: exact technician and
    /// location values or null wildcards, never rules scoped elsewhere.
    pub async fn resolve_pricing(
        &self,
        service_ids: &[Uuid],
        technician_ids: &[Uuid],
        location_id: Option<Uuid>,
    ) -> StoreResult<PricingTable> {
        if service_ids.is_empty() {
            return Ok(PricingTable::default());
        }
        let rules = self
            .store
            .pricing_rules(service_ids, technician_ids, location_id)
            .await?;
        debug!("Loaded {} pricing rules for {} services", rules.len(), service_ids.len());
        Ok(PricingTable::from_rules(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(service: Uuid, tech: Option<Uuid>, loc: Option<Uuid>, price: i64) -> PricingRule {
        PricingRule {
            id: Uuid::new_v4(),
            service_id: service,
            technician_id: tech,
            location_id: loc,
            price,
            is_active: true,
        }
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let (service, tech, loc) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let table = PricingTable::from_rules(vec![
            rule(service, None, None, 100),
            rule(service, None, Some(loc), 200),
            rule(service, Some(tech), None, 300),
            rule(service, Some(tech), Some(loc), 400),
        ]);

        assert_eq!(table.service_price(service, Some(tech), Some(loc)), Some(400));
        assert_eq!(table.service_price(service, Some(tech), None), Some(300));
        assert_eq!(table.service_price(service, Some(Uuid::new_v4()), Some(loc)), Some(200));
        assert_eq!(table.service_price(service, None, None), Some(100));
    }

    #[test]
    fn test_inactive_rules_are_ignored() {
        let service = Uuid::new_v4();
        let mut inactive = rule(service, None, None, 999);
        inactive.is_active = false;

        let table = PricingTable::from_rules(vec![inactive]);
        assert!(table.is_empty());
        assert_eq!(table.service_price(service, None, None), None);
    }

    #[test]
    fn test_bundle_total_is_all_or_nothing() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let table = PricingTable::from_rules(vec![rule(a, None, None, 150), rule(b, None, None, 80)]);

        assert_eq!(table.total_price(&[a, b], None, None), Some(230));
        assert_eq!(table.total_price(&[a, b, c], None, None), None);
        assert_eq!(table.total_price(&[], None, None), None);
    }

    #[test]
    fn test_bundle_total_overflow_is_unpriced() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let table = PricingTable::from_rules(vec![rule(a, None, None, i64::MAX), rule(b, None, None, 1)]);

        assert_eq!(table.total_price(&[a], None, None), Some(i64::MAX));
        assert_eq!(table.total_price(&[a, b], None, None), None);
    }
}
