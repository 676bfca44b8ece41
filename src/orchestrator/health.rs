//! Rolling health of the search front door.

use crate::monitor::RollingWindow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

/// Health thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Operations kept in each rolling window
    pub window: usize,
    pub max_avg_latency_ms: f64,
    pub max_error_rate: f64,
    pub min_cache_hit_rate: f64,
    /// Samples required before any threshold is judged
    pub min_samples: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            window: 100,
            max_avg_latency_ms: 100.0,
            max_error_rate: 0.05,
            min_cache_hit_rate: 0.30,
            min_samples: 10,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthIssueKind {
    SlowQueries,
    HighErrorRate,
    LowCacheHitRate,
    CircuitOpen,
    LastSearchFailed,
}

/// A synthesized problem report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    pub kind: HealthIssueKind,
    pub severity: Severity,
    pub message: String,
    /// Recovery can clear this without an operator
    pub auto_fixable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// No issue at high severity or above
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
    pub issues: Vec<HealthIssue>,
    pub summary: HealthSummary,
}

struct Windows {
    latency_ms: RollingWindow,
    failures: RollingWindow,
    cache_hits: RollingWindow,
    last_check: DateTime<Utc>,
}

/// Rolling latency, error and cache-hit windows over completed operations
pub struct HealthTracker {
    thresholds: HealthThresholds,
    windows: Mutex<Windows>,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        let window = thresholds.window.max(1);
        Self {
            thresholds,
            windows: Mutex::new(Windows {
                latency_ms: RollingWindow::new(window),
                failures: RollingWindow::new(window),
                cache_hits: RollingWindow::new(window),
                last_check: Utc::now(),
            }),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Record one completed operation
    pub fn record(&self, elapsed: Duration, success: bool, cache_hit: bool) {
        let mut windows = self.windows.lock();
        windows.latency_ms.push(elapsed.as_secs_f64() * 1000.0);
        windows.failures.push_flag(!success);
        windows.cache_hits.push_flag(cache_hit);
        windows.last_check = Utc::now();
    }

    pub fn summary(&self) -> HealthSummary {
        let windows = self.windows.lock();
        HealthSummary {
            avg_latency_ms: windows.latency_ms.mean(),
            error_rate: windows.failures.mean(),
            cache_hit_rate: windows.cache_hits.mean(),
            samples: windows.latency_ms.len(),
        }
    }

    /// Current status with `extra` issues reported by the caller
    pub fn status(&self, extra: Vec<HealthIssue>) -> HealthStatus {
        let summary = self.summary();
        let last_check = self.windows.lock().last_check;
        let mut issues = Vec::new();

        if summary.samples >= self.thresholds.min_samples {
            if summary.avg_latency_ms > self.thresholds.max_avg_latency_ms {
                issues.push(HealthIssue {
                    kind: HealthIssueKind::SlowQueries,
                    severity: Severity::Medium,
                    message: format!(
                        "average search time {:.1}ms exceeds {:.0}ms",
                        summary.avg_latency_ms, self.thresholds.max_avg_latency_ms
                    ),
                    auto_fixable: false,
                });
            }
            if summary.error_rate > self.thresholds.max_error_rate {
                issues.push(HealthIssue {
                    kind: HealthIssueKind::HighErrorRate,
                    severity: Severity::High,
                    message: format!(
                        "error rate {:.1}% exceeds {:.1}%",
                        summary.error_rate * 100.0,
                        self.thresholds.max_error_rate * 100.0
                    ),
                    auto_fixable: true,
                });
            }
            if summary.cache_hit_rate < self.thresholds.min_cache_hit_rate {
                issues.push(HealthIssue {
                    kind: HealthIssueKind::LowCacheHitRate,
                    severity: Severity::Low,
                    message: format!(
                        "cache hit rate {:.1}% is below {:.0}%",
                        summary.cache_hit_rate * 100.0,
                        self.thresholds.min_cache_hit_rate * 100.0
                    ),
                    auto_fixable: false,
                });
            }
        }
        issues.extend(extra);

        HealthStatus {
            healthy: issues.iter().all(|issue| issue.severity < Severity::High),
            last_check,
            issues,
            summary,
        }
    }

    pub fn reset(&self) {
        let mut windows = self.windows.lock();
        windows.latency_ms.clear();
        windows.failures.clear();
        windows.cache_hits.clear();
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}
