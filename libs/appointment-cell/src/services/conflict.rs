use std::collections::HashMap;

use uuid::Uuid;

use shared_models::{Occupancy, TimeWindow};

use crate::models::Hold;

/// Claims on technicians and resources for one decision, keyed by owner.
/// Holds are folded in as synthetic claims and are never written back.
#[derive(Debug, Clone, Default)]
pub struct OccupancyIndex {
    technicians: HashMap<Uuid, Vec<TimeWindow>>,
    resources: HashMap<Uuid, Vec<TimeWindow>>,
}

impl OccupancyIndex {
    pub fn new(technician_rows: Vec<Occupancy>, resource_rows: Vec<Occupancy>) -> Self {
        let mut index = Self::default();
        for row in technician_rows {
            index.technicians.entry(row.owner_id).or_default().push(row.window());
        }
        for row in resource_rows {
            index.resources.entry(row.owner_id).or_default().push(row.window());
        }
        index
    }

    pub fn add_holds(&mut self, holds: &[Hold]) {
        for hold in holds {
            if let Some(technician_id) = hold.technician_id {
                self.technicians.entry(technician_id).or_default().push(hold.window());
            }
            if let Some(resource_id) = hold.resource_id {
                self.resources.entry(resource_id).or_default().push(hold.window());
            }
        }
    }

    pub fn technician_free(&self, technician_id: Uuid, window: &TimeWindow) -> bool {
        Self::free(&self.technicians, technician_id, window)
    }

    pub fn resource_free(&self, resource_id: Uuid, window: &TimeWindow) -> bool {
        Self::free(&self.resources, resource_id, window)
    }

    /// Every claim against the technician, held or committed.
    pub fn technician_claims(&self, technician_id: Uuid) -> &[TimeWindow] {
        self.technicians
            .get(&technician_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn free(claims: &HashMap<Uuid, Vec<TimeWindow>>, owner: Uuid, window: &TimeWindow) -> bool {
        claims
            .get(&owner)
            .map_or(true, |windows| !windows.iter().any(|w| w.overlaps(window)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 20, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_committed_rows_and_holds_both_block() {
        let tech = Uuid::new_v4();
        let room = Uuid::new_v4();
        let committed = Occupancy::new(Uuid::new_v4(), tech, TimeWindow::new(at(1, 0), at(2, 0)));
        let mut index = OccupancyIndex::new(vec![committed], Vec::new());

        assert!(!index.technician_free(tech, &TimeWindow::new(at(1, 30), at(2, 30))));
        assert!(index.technician_free(tech, &TimeWindow::new(at(2, 0), at(3, 0))));
        assert!(index.resource_free(room, &TimeWindow::new(at(2, 0), at(3, 0))));

        index.add_holds(&[Hold {
            technician_id: None,
            resource_id: Some(room),
            start_time: at(2, 0),
            end_time: at(3, 0),
        }]);
        assert!(!index.resource_free(room, &TimeWindow::new(at(2, 30), at(3, 30))));
        assert_eq!(index.technician_claims(tech).len(), 1);
        assert!(index.technician_claims(Uuid::new_v4()).is_empty());
    }
}
