//! Resilient search orchestration.
//!
//! [`EnhancedSearchManager`] sits in front of the ranked engine:
//!
//! ```text
//! search_all ──► breaker ──open──► last-good cache ──miss──► fallback
//!                   │
//!                 closed
//!                   ▼
//!              ranked engine ──error──► classify ──► recovery plan
//!                                                   (fallback, rebuild,
//!                                                    reconnect, reduce)
//! ```
//!
//! Every completed search feeds the rolling health windows; a failure that
//! survives `max_attempts` recovery cycles reaches the caller as
//! [`AppError::Search`](crate::error::AppError::Search).

mod classify;
mod config;
mod health;
mod manager;
mod recovery;

pub use classify::{classify, classify_message, to_search_error};
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use health::{
    HealthIssue, HealthIssueKind, HealthStatus, HealthSummary, HealthThresholds, HealthTracker,
    Severity,
};
pub use manager::{static_suggestions, EnhancedSearchManager, SearchComponents, STATIC_SUGGESTIONS};
pub use recovery::{
    plan, RecoveryGuard, RecoveryState, RecoveryStatus, RecoveryStep, RecoveryTracker,
};
