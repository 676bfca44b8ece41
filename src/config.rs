use crate::circuit_breaker::CircuitBreakerConfig;
use crate::db::{ConnectionManager, PoolConfig};
use crate::error::{AppError, Result};
use crate::monitor::MonitorConfig;
use crate::orchestrator::{HealthThresholds, OrchestratorConfig};
use crate::query::QueryConfig;
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and
    /// the environment
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KIOSK_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/kiosk-search.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Like [`load`](Self::load) with an explicit override file
    pub fn load_from(config_path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: KIOSK_SEARCH__)
            .add_source(
                config::Environment::with_prefix("KIOSK_SEARCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component could run with
    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(AppError::Configuration(
                "database.path must not be empty".to_string(),
            ));
        }
        self.pool_config().validate()?;
        self.search_config().validate()?;
        self.orchestrator_config().validate()?;
        self.circuit_breaker_config().validate()?;
        if self.query.max_query_length == 0 || self.query.max_or_terms == 0 {
            return Err(AppError::Configuration(
                "query limits must be greater than 0".to_string(),
            ));
        }
        if self.monitor.window == 0 {
            return Err(AppError::Configuration(
                "monitor.window must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.database.path.clone())
            .with_busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .with_wal(self.database.wal)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_connections: self.pool.min_connections,
            max_connections: self.pool.max_connections,
            acquire_timeout: Duration::from_millis(self.pool.acquire_timeout_ms),
            idle_timeout: Duration::from_secs(self.pool.idle_timeout_secs),
            max_lifetime: Duration::from_secs(self.pool.max_lifetime_secs),
            sweep_interval: Duration::from_secs(self.pool.sweep_interval_secs),
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            default_limit: self.search.default_limit,
            max_limit: self.search.max_limit,
            cache_ttl: Duration::from_secs(self.search.cache_ttl_secs),
            cache_capacity: self.search.cache_capacity,
            cache_sweep_interval: Duration::from_secs(self.search.cache_sweep_interval_secs),
            query_timeout: Duration::from_millis(self.search.query_timeout_ms),
            snippet_max_chars: self.search.snippet_max_chars,
            suggestion_limit: self.search.suggestion_limit,
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            max_cost: self.query.max_cost,
            max_or_terms: self.query.max_or_terms,
            max_query_length: self.query.max_query_length,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            max_attempts: o.max_attempts,
            retry_delay: Duration::from_millis(o.retry_delay_ms),
            rebuild_delay: Duration::from_millis(o.rebuild_delay_ms),
            reduced_limit: o.reduced_limit,
            last_good_ttl: Duration::from_secs(o.last_good_ttl_secs),
            last_good_capacity: o.last_good_capacity,
            health: HealthThresholds {
                window: o.health_window,
                max_avg_latency_ms: o.max_avg_latency_ms,
                max_error_rate: o.max_error_rate,
                min_cache_hit_rate: o.min_cache_hit_rate,
                min_samples: o.min_samples,
            },
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            success_threshold: self.circuit_breaker.success_threshold,
            cooldown: Duration::from_secs(self.circuit_breaker.cooldown_secs),
            half_open_max_requests: self.circuit_breaker.half_open_max_requests,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            window: self.monitor.window,
            slow_operation: Duration::from_millis(self.monitor.slow_operation_ms),
            alert_error_rate: self.monitor.alert_error_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// How long a statement waits on a locked database (milliseconds)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Enable write-ahead logging
    #[serde(default = "default_true")]
    pub wal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    /// Deadline for one per-kind engine query (milliseconds)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,

    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,

    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            cache_sweep_interval_secs: default_sweep_interval(),
            query_timeout_ms: default_query_timeout(),
            snippet_max_chars: default_snippet_max_chars(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    #[serde(default = "default_max_cost")]
    pub max_cost: f64,

    #[serde(default = "default_max_or_terms")]
    pub max_or_terms: usize,

    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
            max_or_terms: default_max_or_terms(),
            max_query_length: default_max_query_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_rebuild_delay")]
    pub rebuild_delay_ms: u64,

    #[serde(default = "default_reduced_limit")]
    pub reduced_limit: usize,

    #[serde(default = "default_last_good_ttl")]
    pub last_good_ttl_secs: u64,

    #[serde(default = "default_last_good_capacity")]
    pub last_good_capacity: u64,

    #[serde(default = "default_window")]
    pub health_window: usize,

    #[serde(default = "default_max_avg_latency")]
    pub max_avg_latency_ms: f64,

    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    #[serde(default = "default_min_cache_hit_rate")]
    pub min_cache_hit_rate: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            rebuild_delay_ms: default_rebuild_delay(),
            reduced_limit: default_reduced_limit(),
            last_good_ttl_secs: default_last_good_ttl(),
            last_good_capacity: default_last_good_capacity(),
            health_window: default_window(),
            max_avg_latency_ms: default_max_avg_latency(),
            max_error_rate: default_max_error_rate(),
            min_cache_hit_rate: default_min_cache_hit_rate(),
            min_samples: default_min_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_one")]
    pub success_threshold: u32,

    #[serde(default = "default_one")]
    pub half_open_max_requests: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_one(),
            half_open_max_requests: default_one(),
            cooldown_secs: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default = "default_slow_operation")]
    pub slow_operation_ms: u64,

    #[serde(default = "default_alert_error_rate")]
    pub alert_error_rate: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window: default_window(),
            slow_operation_ms: default_slow_operation(),
            alert_error_rate: default_alert_error_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("./data/kiosk.sqlite3")
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_min_connections() -> usize {
    1
}

fn default_max_connections() -> usize {
    4
}

fn default_acquire_timeout() -> u64 {
    5000
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    1000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    500
}

fn default_query_timeout() -> u64 {
    2000
}

fn default_snippet_max_chars() -> usize {
    150
}

fn default_suggestion_limit() -> usize {
    10
}

fn default_max_cost() -> f64 {
    100.0
}

fn default_max_or_terms() -> usize {
    8
}

fn default_max_query_length() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_rebuild_delay() -> u64 {
    500
}

fn default_reduced_limit() -> usize {
    10
}

fn default_last_good_ttl() -> u64 {
    3600
}

fn default_last_good_capacity() -> u64 {
    200
}

fn default_window() -> usize {
    100
}

fn default_max_avg_latency() -> f64 {
    100.0
}

fn default_max_error_rate() -> f64 {
    0.05
}

fn default_min_cache_hit_rate() -> f64 {
    0.30
}

fn default_min_samples() -> usize {
    10
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_one() -> u32 {
    1
}

fn default_cooldown() -> u64 {
    30
}

fn default_slow_operation() -> u64 {
    250
}

fn default_alert_error_rate() -> f64 {
    0.10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
