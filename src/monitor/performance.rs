//! Operation timers, rolling statistics and threshold alerts.

use crate::monitor::RollingWindow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::Display;

const MAX_ALERTS: usize = 50;
const MIN_ERROR_SAMPLES: usize = 10;

/// Monitor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Samples kept per operation
    pub window: usize,

    /// Operations slower than this raise an alert
    pub slow_operation: Duration,

    /// Rolling error rate that raises an alert
    pub alert_error_rate: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: 100,
            slow_operation: Duration::from_millis(250),
            alert_error_rate: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    SlowOperation,
    HighErrorRate,
}

/// A threshold crossing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub kind: AlertKind,
    pub operation: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub raised_at: DateTime<Utc>,
}

struct OperationStats {
    durations_ms: RollingWindow,
    failures: RollingWindow,
    count: u64,
    error_count: u64,
    last_ms: f64,
    error_alert_active: bool,
}

impl OperationStats {
    fn new(window: usize) -> Self {
        Self {
            durations_ms: RollingWindow::new(window),
            failures: RollingWindow::new(window),
            count: 0,
            error_count: 0,
            last_ms: 0.0,
            error_alert_active: false,
        }
    }
}

/// Rolling statistics of one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub count: u64,
    pub error_count: u64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
    pub error_rate: f64,
}

/// All operations plus recent alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub alerts: Vec<PerformanceAlert>,
    pub taken_at: DateTime<Utc>,
}

/// Records operation durations and outcomes and raises alerts when
/// thresholds are crossed
pub struct PerformanceMonitor {
    config: MonitorConfig,
    operations: DashMap<String, OperationStats>,
    alerts: Mutex<VecDeque<PerformanceAlert>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            operations: DashMap::new(),
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start timing `operation`
    pub fn start(self: &Arc<Self>, operation: impl Into<String>) -> OperationTracker {
        OperationTracker {
            monitor: Arc::clone(self),
            operation: operation.into(),
            start: Instant::now(),
            completed: false,
        }
    }

    /// Record one completed operation
    pub fn record(&self, operation: &str, duration: Duration, success: bool) {
        let ms = duration.as_secs_f64() * 1000.0;
        let mut raised = Vec::new();

        {
            let mut stats = self
                .operations
                .entry(operation.to_string())
                .or_insert_with(|| OperationStats::new(self.config.window));

            stats.count += 1;
            stats.last_ms = ms;
            stats.durations_ms.push(ms);
            stats.failures.push_flag(!success);
            if !success {
                stats.error_count += 1;
            }

            let slow_ms = self.config.slow_operation.as_secs_f64() * 1000.0;
            if ms > slow_ms {
                raised.push(self.alert(
                    AlertKind::SlowOperation,
                    operation,
                    format!("{} took {:.1}ms", operation, ms),
                    ms,
                    slow_ms,
                ));
            }

            let error_rate = stats.failures.mean();
            let over = stats.failures.len() >= MIN_ERROR_SAMPLES
                && error_rate > self.config.alert_error_rate;
            if over && !stats.error_alert_active {
                raised.push(self.alert(
                    AlertKind::HighErrorRate,
                    operation,
                    format!("{} error rate at {:.0}%", operation, error_rate * 100.0),
                    error_rate,
                    self.config.alert_error_rate,
                ));
            }
            stats.error_alert_active = over;
        }

        if !raised.is_empty() {
            let mut alerts = self.alerts.lock();
            for alert in raised {
                tracing::warn!(
                    kind = %alert.kind,
                    operation = %alert.operation,
                    value = alert.value,
                    threshold = alert.threshold,
                    "Performance alert"
                );
                if alerts.len() == MAX_ALERTS {
                    alerts.pop_front();
                }
                alerts.push_back(alert);
            }
        }
    }

    fn alert(
        &self,
        kind: AlertKind,
        operation: &str,
        message: String,
        value: f64,
        threshold: f64,
    ) -> PerformanceAlert {
        PerformanceAlert {
            kind,
            operation: operation.to_string(),
            message,
            value,
            threshold,
            raised_at: Utc::now(),
        }
    }

    pub fn operation(&self, operation: &str) -> Option<OperationSnapshot> {
        self.operations.get(operation).map(|stats| OperationSnapshot {
            count: stats.count,
            error_count: stats.error_count,
            avg_ms: stats.durations_ms.mean(),
            p95_ms: stats.durations_ms.percentile(95.0),
            max_ms: stats.durations_ms.max(),
            last_ms: stats.last_ms,
            error_rate: stats.failures.mean(),
        })
    }

    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.alerts.lock().iter().cloned().collect()
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let names: Vec<String> = self.operations.iter().map(|e| e.key().clone()).collect();
        let operations = names
            .into_iter()
            .filter_map(|name| self.operation(&name).map(|snap| (name, snap)))
            .collect();

        PerformanceSnapshot {
            operations,
            alerts: self.alerts(),
            taken_at: Utc::now(),
        }
    }

    pub fn reset(&self) {
        self.operations.clear();
        self.alerts.lock().clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

/// RAII timer for one operation.
///
/// Dropping it without calling [`success`](Self::success) or
/// [`error`](Self::error) records a failure.
#[must_use]
pub struct OperationTracker {
    monitor: Arc<PerformanceMonitor>,
    operation: String,
    start: Instant,
    completed: bool,
}

impl OperationTracker {
    pub fn success(mut self) -> Duration {
        self.complete(true)
    }

    pub fn error(mut self) -> Duration {
        self.complete(false)
    }

    /// Stop timing without recording anything
    pub fn discard(mut self) {
        self.completed = true;
    }

    fn complete(&mut self, success: bool) -> Duration {
        let elapsed = self.start.elapsed();
        self.monitor.record(&self.operation, elapsed, success);
        self.completed = true;
        elapsed
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(operation = %self.operation, "Operation tracker dropped without completion");
            self.complete(false);
        }
    }
}
