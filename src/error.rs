use thiserror::Error;

/// Errors raised by the scheduling core. Malformed review history is
/// normalized, never reported; only a missing identity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Invalid item: id must be a positive integer, got {0}")]
    InvalidItem(i64),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Problem {0} not found")]
    NotFound(i64),

    #[error("Problem text must not be empty")]
    EmptyText,

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
