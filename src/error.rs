use thiserror::Error;

use crate::config::LoadError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
    #[error("invalid prime schedule `{expression}`: {reason}")]
    Schedule { expression: String, reason: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
