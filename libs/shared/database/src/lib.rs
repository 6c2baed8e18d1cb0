pub mod error;
pub mod ledger;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use ledger::Ledger;
pub use memory::{InMemoryStore, SeedData};
pub use store::{SchedulingStore, ShiftFilter};
