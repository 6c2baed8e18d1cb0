use std::env;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Local-time bounds of a named shift period, e.g. `08:30-12:30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl PeriodBounds {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parses `HH:MM-HH:MM`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.split_once('-')?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
        Some(Self { start, end })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Business timezone as a fixed offset east of UTC.
    pub utc_offset_minutes: i32,
    pub morning_window: PeriodBounds,
    pub afternoon_window: PeriodBounds,
    pub max_plan_days: i64,
    pub default_slot_interval_minutes: i64,
    pub default_calendar_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 8 * 60,
            morning_window: PeriodBounds::new(hm(8, 30), hm(12, 30)),
            afternoon_window: PeriodBounds::new(hm(14, 0), hm(18, 0)),
            max_plan_days: 30,
            default_slot_interval_minutes: 60,
            default_calendar_days: 14,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let utc_offset_minutes = parse_var("BUSINESS_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)
            .clamp(-14 * 60, 14 * 60);

        let morning_window = window_var("MORNING_WINDOW", defaults.morning_window);
        let afternoon_window = window_var("AFTERNOON_WINDOW", defaults.afternoon_window);

        let max_plan_days = parse_var("MAX_SHIFT_PLAN_DAYS", defaults.max_plan_days).max(1);
        let default_slot_interval_minutes =
            parse_var("DEFAULT_SLOT_INTERVAL_MINUTES", defaults.default_slot_interval_minutes).max(1);
        let default_calendar_days = parse_var("DEFAULT_CALENDAR_DAYS", defaults.default_calendar_days)
            .clamp(1, max_plan_days);

        Self {
            utc_offset_minutes,
            morning_window,
            afternoon_window,
            max_plan_days,
            default_slot_interval_minutes,
            default_calendar_days,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub bind_addr: String,
    pub seed_data_path: Option<String>,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| {
                    warn!("BIND_ADDR not set, using default");
                    "0.0.0.0:3000".to_string()
                }),
            seed_data_path: env::var("SEED_DATA_PATH").ok(),
            scheduling: SchedulingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn window_var(key: &str, default: PeriodBounds) -> PeriodBounds {
    match env::var(key) {
        Ok(raw) => PeriodBounds::parse(&raw).unwrap_or_else(|| {
            warn!("{} has invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
