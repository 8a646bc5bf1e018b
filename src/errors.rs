use thiserror::Error;

use crate::external::data_provider::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage backend '{0}' unavailable")]
    BackendUnavailable(String),
    #[error("Step '{step}' failed: {message}")]
    StepFailure { step: String, message: String },
    #[error("Scheduling error: {0}")]
    Scheduling(String),
    #[error("External error: {0}")]
    External(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::StepFailure {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<ProviderError> for AppError {
    fn from(value: ProviderError) -> Self {
        AppError::External(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::InvalidInput(value.to_string())
    }
}
