use std::collections::HashMap;

use uuid::Uuid;

use shared_models::{Occupancy, TimeWindow};

/// Occupancy intervals per owner (technician or resource), each owner's list
/// kept sorted by start time. No two intervals of one owner overlap.
#[derive(Debug, Default)]
pub struct Ledger {
    kind: &'static str,
    entries: HashMap<Uuid, Vec<Occupancy>>,
}

impl Ledger {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Intervals of `owner` overlapping `window`.
    /// Uses binary search to skip intervals starting at or after `window.end`.
    pub fn overlapping(&self, owner: &Uuid, window: TimeWindow) -> impl Iterator<Item = &Occupancy> {
        let entries = self.entries.get(owner).map(Vec::as_slice).unwrap_or(&[]);
        let right_bound = entries.partition_point(|o| o.start_time < window.end);
        entries[..right_bound]
            .iter()
            .filter(move |o| o.end_time > window.start)
    }

    pub fn first_conflict(&self, owner: &Uuid, window: TimeWindow) -> Option<&Occupancy> {
        self.overlapping(owner, window).next()
    }

    /// Returns the id of the conflicting row if the claim cannot be taken.
    pub fn check(&self, occupancy: &Occupancy) -> Result<(), Uuid> {
        match self.first_conflict(&occupancy.owner_id, occupancy.window()) {
            Some(existing) => Err(existing.id),
            None => Ok(()),
        }
    }

    /// Inserts keeping start order. Callers must `check` first.
    pub fn insert_unchecked(&mut self, occupancy: Occupancy) {
        let list = self.entries.entry(occupancy.owner_id).or_default();
        let pos = list.partition_point(|o| o.start_time <= occupancy.start_time);
        list.insert(pos, occupancy);
    }

    pub fn insert(&mut self, occupancy: Occupancy) -> Result<(), Uuid> {
        self.check(&occupancy)?;
        self.insert_unchecked(occupancy);
        Ok(())
    }

    /// Removes every row belonging to `appointment_id`; returns how many.
    pub fn release_appointment(&mut self, appointment_id: Uuid) -> usize {
        let mut removed = 0;
        for list in self.entries.values_mut() {
            let before = list.len();
            list.retain(|o| o.appointment_id != appointment_id);
            removed += before - list.len();
        }
        removed
    }

    pub fn query(&self, owners: &[Uuid], window: TimeWindow) -> Vec<Occupancy> {
        owners
            .iter()
            .flat_map(|owner| self.overlapping(owner, window).cloned())
            .collect()
    }
}
