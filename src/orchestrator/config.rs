use crate::error::{AppError, Result};
use crate::orchestrator::health::HealthThresholds;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recovery and health settings of the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Recovery cycles before a failure is surfaced
    pub max_attempts: u32,

    /// Pause between recovery cycles
    pub retry_delay: Duration,

    /// Delay before a scheduled background rebuild starts
    pub rebuild_delay: Duration,

    /// Limit used when retrying a timed-out query
    pub reduced_limit: usize,

    /// How long a good response stays available to an open circuit
    pub last_good_ttl: Duration,

    pub last_good_capacity: u64,

    pub health: HealthThresholds,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            rebuild_delay: Duration::from_millis(500),
            reduced_limit: 10,
            last_good_ttl: Duration::from_secs(3600),
            last_good_capacity: 200,
            health: HealthThresholds::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Configuration(
                "orchestrator.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reduced_limit == 0 {
            return Err(AppError::Configuration(
                "orchestrator.reduced_limit must be at least 1".to_string(),
            ));
        }
        if self.health.window == 0 {
            return Err(AppError::Configuration(
                "orchestrator.health_window must be at least 1".to_string(),
            ));
        }
        for (name, rate) in [
            ("max_error_rate", self.health.max_error_rate),
            ("min_cache_hit_rate", self.health.min_cache_hit_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AppError::Configuration(format!(
                    "orchestrator.{} must be between 0 and 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn rebuild_delay(mut self, delay: Duration) -> Self {
        self.config.rebuild_delay = delay;
        self
    }

    pub fn reduced_limit(mut self, limit: usize) -> Self {
        self.config.reduced_limit = limit;
        self
    }

    pub fn last_good_ttl(mut self, ttl: Duration) -> Self {
        self.config.last_good_ttl = ttl;
        self
    }

    pub fn health(mut self, thresholds: HealthThresholds) -> Self {
        self.config.health = thresholds;
        self
    }

    pub fn build(self) -> Result<OrchestratorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.health.max_avg_latency_ms, 100.0);
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        assert!(OrchestratorConfig::builder().max_attempts(0).build().is_err());
        let config = OrchestratorConfig::builder()
            .max_attempts(1)
            .retry_delay(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(config.retry_delay, Duration::ZERO);
    }
}
