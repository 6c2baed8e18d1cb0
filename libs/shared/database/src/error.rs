use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A write would have produced two overlapping claims for the same
    /// technician or resource. Nothing was written.
    #[error("{owner_kind} {owner_id} already claimed by {conflicting_id} in the requested window")]
    OverlapViolation {
        owner_kind: &'static str,
        owner_id: Uuid,
        conflicting_id: Uuid,
    },

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
