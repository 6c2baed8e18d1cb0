pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::ShiftError;
pub use models::*;
pub use services::policy::{PolicyResolver, ResolvedPolicy};
pub use services::pricing::{PricingResolver, PricingTable};
pub use services::shift::ShiftService;
pub use services::technician::TechnicianDirectory;
