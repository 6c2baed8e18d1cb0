use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::SchedulingStore;

use crate::time::{BusinessCalendar, Clock, SystemClock};

/// Everything a request handler needs, built once at startup and cloned
/// into each request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub clock: Arc<dyn Clock>,
    pub calendar: BusinessCalendar,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SchedulingStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Arc<AppConfig>,
        store: Arc<dyn SchedulingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let calendar = BusinessCalendar::new(&config.scheduling);
        Self {
            config,
            store,
            clock,
            calendar,
        }
    }
}
