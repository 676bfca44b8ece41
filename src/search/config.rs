//! Search configuration

use crate::error::{AppError, Result};
use crate::models::{DEFAULT_LIMIT, MAX_LIMIT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ranked search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Limit used when the caller does not pass one
    pub default_limit: usize,

    /// Ceiling applied to every caller-supplied limit
    pub max_limit: usize,

    /// How long a cached response stays valid
    pub cache_ttl: Duration,

    /// Maximum number of cached responses
    pub cache_capacity: u64,

    /// Interval of the background cache sweep
    pub cache_sweep_interval: Duration,

    /// Deadline for one per-kind engine query
    pub query_timeout: Duration,

    /// Snippet length in characters, ellipsis markers excluded
    pub snippet_max_chars: usize,

    /// Suggestions returned when the caller passes 0
    pub suggestion_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 500,
            cache_sweep_interval: Duration::from_secs(60),
            query_timeout: Duration::from_millis(2000),
            snippet_max_chars: 150,
            suggestion_limit: 10,
        }
    }
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(AppError::Configuration(
                "search limits must be greater than 0".to_string(),
            ));
        }
        if self.default_limit > self.max_limit {
            return Err(AppError::Configuration(
                "default_limit must not exceed max_limit".to_string(),
            ));
        }
        if self.query_timeout.is_zero() {
            return Err(AppError::Configuration(
                "query_timeout must be greater than 0".to_string(),
            ));
        }
        if self.snippet_max_chars < 20 {
            return Err(AppError::Configuration(
                "snippet_max_chars must be at least 20".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.max_limit = limit;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.cache_sweep_interval = interval;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    pub fn snippet_max_chars(mut self, chars: usize) -> Self {
        self.config.snippet_max_chars = chars;
        self
    }

    pub fn suggestion_limit(mut self, limit: usize) -> Self {
        self.config.suggestion_limit = limit;
        self
    }

    pub fn build(self) -> Result<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
