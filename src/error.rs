use crate::db::PoolError;
use crate::search::SearchError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Errors raised by the embedded SQLite engine
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    /// Validation errors (malformed or dangerous input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The full-text index for a kind is missing or unusable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The full-text index failed an integrity check
    #[error("Index corruption detected: {0}")]
    IndexCorrupt(String),

    /// Memory, disk or pool capacity ran out
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Circuit breaker rejected the call
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    /// Classified search failure surfaced after recovery gave up
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Pool(_) => "POOL_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            AppError::IndexCorrupt(_) => "INDEX_CORRUPT",
            AppError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            AppError::CircuitOpen(_) => "CIRCUIT_OPEN",
            AppError::Search(_) => "SEARCH_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Blocking engine tasks that panic or get cancelled surface as internal errors
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("engine task failed: {}", err))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
