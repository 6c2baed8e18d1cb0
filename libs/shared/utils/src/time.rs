use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;

use shared_config::{PeriodBounds, SchedulingConfig};
use shared_models::{Period, TimeWindow};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid window for {period} on {date}: end is not after start")]
    InvalidWindow { date: NaiveDate, period: Period },

    #[error("Invalid instant: {0}")]
    InvalidInstant(String),
}

/// Source of "now". Everything that needs today's date or an audit stamp
/// goes through this so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Maps calendar dates and named periods onto UTC instants in the business
/// timezone. Host-local time is never consulted.
#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    offset: FixedOffset,
    morning: PeriodBounds,
    afternoon: PeriodBounds,
}

impl BusinessCalendar {
    pub fn new(config: &SchedulingConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                "Offset of {} minutes is out of range, falling back to UTC",
                config.utc_offset_minutes
            );
            Utc.fix()
        });

        Self {
            offset,
            morning: config.morning_window,
            afternoon: config.afternoon_window,
        }
    }

    fn bounds(&self, period: Period) -> PeriodBounds {
        match period {
            Period::Morning => self.morning,
            Period::Afternoon => self.afternoon,
        }
    }

    /// Business-local wall time to UTC.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        (naive - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.localize(date.and_time(time))
    }

    pub fn period_window(&self, date: NaiveDate, period: Period) -> Result<TimeWindow, TimeError> {
        let bounds = self.bounds(period);
        if bounds.end <= bounds.start {
            return Err(TimeError::InvalidWindow { date, period });
        }
        Ok(TimeWindow::new(self.at(date, bounds.start), self.at(date, bounds.end)))
    }

    pub fn period_window_for_key(&self, date: NaiveDate, key: &str) -> Result<TimeWindow, TimeError> {
        let period = key
            .parse::<Period>()
            .map_err(|e| TimeError::InvalidPeriod(e.0))?;
        self.period_window(date, period)
    }

    /// Which configured period contains `instant`, if any.
    pub fn period_for_instant(&self, instant: DateTime<Utc>) -> Option<Period> {
        let date = self.local_date(instant);
        Period::ALL.into_iter().find(|period| {
            self.period_window(date, *period)
                .map(|window| window.contains_instant(instant))
                .unwrap_or(false)
        })
    }

    /// Period whose window matches `window` exactly. Shifts stored without a
    /// period label are attributed this way.
    pub fn infer_period(&self, window: &TimeWindow) -> Option<Period> {
        let date = self.local_date(window.start);
        Period::ALL
            .into_iter()
            .find(|period| self.period_window(date, *period).ok().as_ref() == Some(window))
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// `[00:00, next day 00:00)` local.
    pub fn day_window(&self, date: NaiveDate) -> TimeWindow {
        let start = self.at(date, NaiveTime::MIN);
        TimeWindow::new(start, start + Duration::days(1))
    }

    pub fn today(&self, clock: &dyn Clock) -> NaiveDate {
        self.local_date(clock.now())
    }

    /// Accepts RFC 3339 with an explicit offset, or a naive ISO timestamp
    /// which is read as business-local time.
    pub fn parse_instant(&self, raw: &str) -> Result<DateTime<Utc>, TimeError> {
        let raw = raw.trim();
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Ok(with_offset.with_timezone(&Utc));
        }

        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| self.localize(naive))
            .ok_or_else(|| TimeError::InvalidInstant(raw.to_string()))
    }

    pub fn format_hhmm(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}
