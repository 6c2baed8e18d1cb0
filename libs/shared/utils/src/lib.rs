pub mod extractor;
pub mod jwt;
pub mod state;
pub mod test_utils;
pub mod time;

pub use state::AppState;
pub use time::{BusinessCalendar, Clock, FixedClock, SystemClock, TimeError};
