//! Circuit breaker guarding the ranked search engine.
//!
//! After `failure_threshold` consecutive failures the circuit opens and
//! callers short-circuit to cached or fallback results without touching the
//! engine. Once the cooldown elapses one trial call is let through; success
//! closes the circuit, failure re-opens it and restarts the cooldown.
//!
//! # Circuit Breaker States
//!
//! - **Closed**: calls pass through, consecutive failures are counted
//! - **Open**: calls are rejected immediately
//! - **Half-Open**: a limited number of trial calls test recovery
//!
//! # Example
//!
//! ```no_run
//! use kiosk_search::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig::builder()
//!     .failure_threshold(5)
//!     .cooldown(Duration::from_secs(30))
//!     .build()?;
//! let breaker = CircuitBreaker::new("ranked-search", config);
//!
//! let hits = breaker.call(|| async { Ok::<_, String>(3) }).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod core;
mod metrics;
mod state;

pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use core::{CallPermit, CircuitBreaker, CircuitBreakerStats};
pub use metrics::{init_circuit_breaker_metrics, CIRCUIT_BREAKER_METRICS};
pub use state::{CircuitBreakerState, StateData, StateTransition};

use crate::error::AppError;
use std::time::Duration;

/// Result type for circuit breaker operations
pub type CircuitBreakerResult<T> = std::result::Result<T, CircuitBreakerError>;

/// Errors that can occur in circuit breaker operations
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    /// Circuit is open and rejecting calls
    #[error("circuit breaker '{name}' is open (retry in {retry_after:?})")]
    Open { name: String, retry_after: Duration },

    #[error("invalid circuit breaker configuration: {0}")]
    InvalidConfig(String),

    /// The protected operation failed
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl From<CircuitBreakerError> for AppError {
    fn from(err: CircuitBreakerError) -> Self {
        match err {
            CircuitBreakerError::Open { name, .. } => AppError::CircuitOpen(name),
            CircuitBreakerError::InvalidConfig(msg) => AppError::Configuration(msg),
            CircuitBreakerError::OperationFailed(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_error_conversion() {
        let err = CircuitBreakerError::Open {
            name: "ranked-search".to_string(),
            retry_after: Duration::from_secs(3),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::CircuitOpen(ref name) if name == "ranked-search"));

        let app_err: AppError = CircuitBreakerError::InvalidConfig("x".into()).into();
        assert_eq!(app_err.error_code(), "CONFIGURATION_ERROR");
    }
}
