//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Supervisor task failed: {0}")]
    Task(String),
}

pub type AppResult<T> = Result<T, AppError>;
