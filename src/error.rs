// ⚠️ Error Types
// Typed failures the API maps to status codes; everything else travels as anyhow::Error

use thiserror::Error;

use crate::schedule::ScheduleError;

#[derive(Debug, Error)]
pub enum OkrError {
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl OkrError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        OkrError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        OkrError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type OkrResult<T> = std::result::Result<T, OkrError>;
