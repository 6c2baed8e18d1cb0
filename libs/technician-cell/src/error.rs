use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::{AppError, ErrorKind};
use shared_utils::TimeError;

#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ShiftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShiftError::NotFound { .. } => ErrorKind::NotFound,
            ShiftError::InvalidInput(_) => ErrorKind::InvalidInput,
            ShiftError::Conflict(_) => ErrorKind::Conflict,
            ShiftError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            ShiftError::Store(_) => ErrorKind::Conflict,
        }
    }
}

impl From<TimeError> for ShiftError {
    fn from(e: TimeError) -> Self {
        ShiftError::InvalidInput(e.to_string())
    }
}

impl From<ShiftError> for AppError {
    fn from(e: ShiftError) -> Self {
        e.kind().into_app_error(e.to_string())
    }
}
