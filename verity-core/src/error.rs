use thiserror::Error;

use crate::models::PredictionId;

#[derive(Error, Debug)]
pub enum VerityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Prediction {prediction_id} not found")]
    NotFound { prediction_id: PredictionId },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerityError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the failure came from the persistence layer rather than the caller.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
