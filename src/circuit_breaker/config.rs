//! Circuit breaker configuration with builder pattern.

use crate::circuit_breaker::CircuitBreakerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Successes in half-open state needed to close again
    pub success_threshold: u32,

    /// How long the circuit stays open before a trial call is let through
    pub cooldown: Duration,

    /// Trial calls allowed at once while half-open
    pub half_open_max_requests: u32,
}

impl CircuitBreakerConfig {
    /// Create a new builder for CircuitBreakerConfig
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidConfig(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.success_threshold == 0 {
            return Err(CircuitBreakerError::InvalidConfig(
                "success_threshold must be greater than 0".to_string(),
            ));
        }

        if self.cooldown.is_zero() {
            return Err(CircuitBreakerError::InvalidConfig(
                "cooldown must be greater than 0".to_string(),
            ));
        }

        if self.half_open_max_requests < self.success_threshold {
            return Err(CircuitBreakerError::InvalidConfig(
                "half_open_max_requests must be at least success_threshold".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

/// Builder for CircuitBreakerConfig with fluent API
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: Option<u32>,
    success_threshold: Option<u32>,
    cooldown: Option<Duration>,
    half_open_max_requests: Option<u32>,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn half_open_max_requests(mut self, max: u32) -> Self {
        self.half_open_max_requests = Some(max);
        self
    }

    /// Build the configuration. Unset fields take their defaults, except that
    /// `half_open_max_requests` follows `success_threshold` when left unset.
    pub fn build(self) -> Result<CircuitBreakerConfig, CircuitBreakerError> {
        let default = CircuitBreakerConfig::default();
        let success_threshold = self.success_threshold.unwrap_or(default.success_threshold);

        let config = CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(default.failure_threshold),
            success_threshold,
            cooldown: self.cooldown.unwrap_or(default.cooldown),
            half_open_max_requests: self
                .half_open_max_requests
                .unwrap_or_else(|| default.half_open_max_requests.max(success_threshold)),
        };

        config.validate()?;
        Ok(config)
    }
}
