use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::{SchedulingStore, ShiftFilter, StoreError};
use shared_models::{Period, Shift, TimeWindow};
use shared_utils::{AppState, BusinessCalendar, Clock};

use crate::error::ShiftError;
use crate::models::{
    CalendarDay, CalendarSlot, LocationDay, LocationOption, ShiftCalendar, ShiftCreateItem,
    ShiftListQuery,
};

/// Owns every mutation of shift rows.
pub struct ShiftService {
    store: Arc<dyn SchedulingStore>,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
    settings: SchedulingConfig,
}

impl ShiftService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            calendar: state.calendar,
            clock: state.clock.clone(),
            settings: state.config.scheduling.clone(),
        }
    }

    /// Creates the requested day/period shifts. Items that duplicate or
    /// overlap an existing active shift are skipped; only the shifts actually
    /// written are returned.
    pub async fn create_shifts(
        &self,
        technician_id: Uuid,
        items: Vec<ShiftCreateItem>,
        actor: Uuid,
        locked: bool,
    ) -> Result<Vec<Shift>, ShiftError> {
        debug!(
            "Creating {} shift items for technician {} (actor {}, locked {})",
            items.len(),
            technician_id,
            actor,
            locked
        );

        if items.is_empty() {
            return Ok(Vec::new());
        }

        if self.store.get_technician(technician_id).await?.is_none() {
            return Err(ShiftError::NotFound { entity: "technician", id: technician_id });
        }

        let today = self.calendar.today(self.clock.as_ref());
        let last_day = today + Duration::days(self.settings.max_plan_days);

        let mut planned = Vec::with_capacity(items.len());
        for item in &items {
            if item.date < today || item.date > last_day {
                return Err(ShiftError::InvalidInput(format!(
                    "date {} is outside the planning horizon {} to {}",
                    item.date, today, last_day
                )));
            }
            let period: Period = item
                .period
                .parse()
                .map_err(|_| ShiftError::InvalidInput(format!("unknown period '{}'", item.period)))?;
            let window = self.calendar.period_window(item.date, period)?;
            planned.push((item.date, period, item.location_id, window));
        }

        let known: HashSet<Uuid> = self
            .store
            .list_locations()
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        if let Some(missing) = planned.iter().map(|p| p.2).find(|id| !known.contains(id)) {
            return Err(ShiftError::NotFound { entity: "location", id: missing });
        }

        let first = planned.iter().map(|p| p.0).min().unwrap_or(today);
        let last = planned.iter().map(|p| p.0).max().unwrap_or(today);
        let range = self
            .calendar
            .day_window(first)
            .union(&self.calendar.day_window(last));

        let mut existing = self
            .store
            .find_shifts(&ShiftFilter::active_for(vec![technician_id], None, range))
            .await?;
        let mut taken: HashSet<(NaiveDate, Period)> = existing
            .iter()
            .filter_map(|s| self.slot_key(s))
            .collect();

        let now = self.clock.now();
        let mut created = Vec::new();

        for (date, period, location_id, window) in planned {
            if taken.contains(&(date, period)) {
                debug!("Skipping {} {}: already scheduled", date, period);
                continue;
            }
            if let Some(clash) = existing.iter().find(|s| s.window().overlaps(&window)) {
                warn!(
                    "Skipping {} {} for technician {}: overlaps shift {}",
                    date, period, technician_id, clash.id
                );
                continue;
            }

            let shift = Shift {
                id: Uuid::new_v4(),
                technician_id,
                location_id,
                start_time: window.start,
                end_time: window.end,
                period: Some(period),
                is_cancelled: false,
                locked_by_admin: locked,
                created_by: actor,
                cancelled_by: None,
                cancelled_at: None,
                created_at: now,
            };

            match self.store.insert_shift(shift).await {
                Ok(shift) => {
                    taken.insert((date, period));
                    existing.push(shift.clone());
                    created.push(shift);
                }
                Err(StoreError::OverlapViolation { conflicting_id, .. }) => {
                    warn!(
                        "Skipping {} {} for technician {}: concurrent shift {}",
                        date, period, technician_id, conflicting_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Created {} of {} requested shifts for technician {}",
            created.len(),
            items.len(),
            technician_id
        );
        Ok(created)
    }

    /// Idempotent on already-cancelled shifts. Refuses while a live
    /// appointment sits inside the shift window.
    pub async fn cancel_shift(&self, shift_id: Uuid, actor: Uuid) -> Result<Shift, ShiftError> {
        debug!("Cancelling shift {} (actor {})", shift_id, actor);

        let shift = self
            .store
            .get_shift(shift_id)
            .await?
            .ok_or(ShiftError::NotFound { entity: "shift", id: shift_id })?;

        if shift.is_cancelled {
            debug!("Shift {} already cancelled", shift_id);
            return Ok(shift);
        }

        match self.store.cancel_shift(shift_id, actor, self.clock.now()).await {
            Ok(cancelled) => {
                info!("Shift {} cancelled by {}", shift_id, actor);
                Ok(cancelled)
            }
            Err(StoreError::Conflict(reason)) => {
                warn!("Refusing to cancel shift {}: {}", shift_id, reason);
                Err(ShiftError::Conflict(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Which upcoming days have active shifts at the location, starting
    /// today with `days` clamped to the planning horizon.
    pub async fn location_day_summary(
        &self,
        location_id: Uuid,
        days: Option<i64>,
    ) -> Result<Vec<LocationDay>, ShiftError> {
        if self.store.get_location(location_id).await?.is_none() {
            return Err(ShiftError::NotFound { entity: "location", id: location_id });
        }

        let (today, days, range) = self.horizon(days);
        let filter = ShiftFilter {
            technician_ids: None,
            location_id: Some(location_id),
            window: Some(range),
            include_cancelled: false,
        };
        let shifts = self.store.find_shifts(&filter).await?;

        let summary = (0..days)
            .map(|offset| {
                let date = today + Duration::days(offset);
                let on_day: Vec<&Shift> = shifts
                    .iter()
                    .filter(|s| self.calendar.local_date(s.start_time) == date)
                    .collect();
                let open = |period: Period| match self.calendar.period_window(date, period) {
                    Ok(window) => on_day.iter().any(|s| s.window().overlaps(&window)),
                    Err(_) => false,
                };
                let technicians: HashSet<Uuid> = on_day.iter().map(|s| s.technician_id).collect();
                LocationDay {
                    date,
                    weekday: date.format("%a").to_string(),
                    has_morning: open(Period::Morning),
                    has_afternoon: open(Period::Afternoon),
                    technician_count: technicians.len(),
                }
            })
            .collect();
        Ok(summary)
    }

    /// Per-day morning/afternoon view starting today, `days` clamped to the
    /// planning horizon.
    pub async fn get_calendar(
        &self,
        technician_id: Uuid,
        days: Option<i64>,
        include_cancelled: bool,
    ) -> Result<ShiftCalendar, ShiftError> {
        if self.store.get_technician(technician_id).await?.is_none() {
            return Err(ShiftError::NotFound { entity: "technician", id: technician_id });
        }

        let (today, days, range) = self.horizon(days);
        let filter = ShiftFilter {
            technician_ids: Some(vec![technician_id]),
            location_id: None,
            window: Some(range),
            include_cancelled,
        };
        let shifts = self.store.find_shifts(&filter).await?;
        let occupancies = self
            .store
            .technician_occupancies(&[technician_id], range)
            .await?;
        let locations = self.store.list_locations().await?;
        let names: HashMap<Uuid, &str> = locations.iter().map(|l| (l.id, l.name.as_str())).collect();

        let mut active: HashMap<(NaiveDate, Period), &Shift> = HashMap::new();
        let mut cancelled: HashMap<(NaiveDate, Period), &Shift> = HashMap::new();
        for shift in &shifts {
            let Some(key) = self.slot_key(shift) else {
                continue;
            };
            if shift.is_cancelled {
                cancelled.entry(key).or_insert(shift);
            } else {
                active.insert(key, shift);
            }
        }

        let slot_for = |key: (NaiveDate, Period)| -> CalendarSlot {
            if let Some(shift) = active.get(&key) {
                let window = shift.window();
                CalendarSlot {
                    is_active: true,
                    is_cancelled: false,
                    shift_id: Some(shift.id),
                    location_id: Some(shift.location_id),
                    location_name: names.get(&shift.location_id).map(|n| n.to_string()),
                    locked_by_admin: shift.locked_by_admin,
                    has_bookings: occupancies.iter().any(|o| o.window().overlaps(&window)),
                }
            } else if let Some(shift) = cancelled.get(&key) {
                CalendarSlot {
                    is_active: false,
                    is_cancelled: true,
                    shift_id: Some(shift.id),
                    location_id: Some(shift.location_id),
                    location_name: names.get(&shift.location_id).map(|n| n.to_string()),
                    locked_by_admin: shift.locked_by_admin,
                    has_bookings: false,
                }
            } else {
                CalendarSlot::default()
            }
        };

        let days = (0..days)
            .map(|offset| {
                let date = today + Duration::days(offset);
                CalendarDay {
                    date,
                    weekday: date.format("%a").to_string(),
                    morning: slot_for((date, Period::Morning)),
                    afternoon: slot_for((date, Period::Afternoon)),
                }
            })
            .collect();

        Ok(ShiftCalendar {
            generated_at: self.clock.now(),
            days,
            locations: locations.iter().map(LocationOption::from).collect(),
        })
    }

    /// Admin listing, ordered by start time.
    pub async fn list_shifts(&self, query: &ShiftListQuery) -> Result<Vec<Shift>, ShiftError> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if end < start {
                return Err(ShiftError::InvalidInput(format!(
                    "end_date {} is before start_date {}",
                    end, start
                )));
            }
        }

        let window = match (query.start_date, query.end_date) {
            (None, None) => None,
            (start, end) => Some(TimeWindow::new(
                start
                    .map(|d| self.calendar.day_window(d).start)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                end.map(|d| self.calendar.day_window(d).end)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            )),
        };

        let filter = ShiftFilter {
            technician_ids: query.technician_id.map(|id| vec![id]),
            location_id: query.location_id,
            window,
            include_cancelled: query.include_cancelled,
        };
        Ok(self.store.find_shifts(&filter).await?)
    }

    pub async fn list_locations(&self) -> Result<Vec<LocationOption>, ShiftError> {
        let locations = self.store.list_locations().await?;
        Ok(locations.iter().map(LocationOption::from).collect())
    }

    /// First day, day count and covered span of a day-by-day view.
    fn horizon(&self, days: Option<i64>) -> (NaiveDate, i64, TimeWindow) {
        let days = days
            .unwrap_or(self.settings.default_calendar_days)
            .clamp(1, self.settings.max_plan_days.max(1));
        let today = self.calendar.today(self.clock.as_ref());
        let last = today + Duration::days(days - 1);
        let range = self
            .calendar
            .day_window(today)
            .union(&self.calendar.day_window(last));
        (today, days, range)
    }

    fn slot_key(&self, shift: &Shift) -> Option<(NaiveDate, Period)> {
        let period = shift
            .period
            .or_else(|| self.calendar.infer_period(&shift.window()))?;
        Some((self.calendar.local_date(shift.start_time), period))
    }
}
