//! Recovery plans and the guard that keeps recovery from nesting.

use crate::search::{RecoveryAction, SearchErrorKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};

/// One step of a recovery plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RecoveryStep {
    /// Answer with the substring scan
    Fallback,
    /// Rebuild every index, then retry the ranked path
    RebuildAndRetry,
    /// Drop all engine handles, reconnect, then retry the ranked path
    ReconnectAndRetry,
    /// Retry the ranked path with the first term and a smaller limit
    ReducedRetry,
}

/// Steps tried in order for one recovery cycle. Empty means the error is
/// surfaced without retrying.
pub fn plan(kind: SearchErrorKind) -> &'static [RecoveryStep] {
    use RecoveryStep::*;
    match kind {
        SearchErrorKind::IndexError | SearchErrorKind::IndexCorrupt => &[Fallback, RebuildAndRetry],
        SearchErrorKind::ConnectionError => &[ReconnectAndRetry, Fallback],
        SearchErrorKind::Timeout => &[ReducedRetry, Fallback],
        SearchErrorKind::ResourceExhaustion | SearchErrorKind::Unknown => &[Fallback],
        SearchErrorKind::Validation => &[],
    }
}

/// Orchestrator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case", tag = "phase")]
#[strum(serialize_all = "kebab-case")]
pub enum RecoveryState {
    Idle,
    Recovering {
        kind: SearchErrorKind,
        since: DateTime<Utc>,
    },
}

/// Shared recovery phase. Only one recovery runs at a time; a search that
/// fails while another is recovering goes straight to the fallback.
#[derive(Debug, Clone)]
pub struct RecoveryTracker {
    state: Arc<Mutex<RecoveryState>>,
}

impl RecoveryTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecoveryState::Idle)),
        }
    }

    pub fn state(&self) -> RecoveryState {
        *self.state.lock()
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.state(), RecoveryState::Recovering { .. })
    }

    /// Enter the recovering phase, or `None` if a recovery is already running
    pub fn try_begin(&self, kind: SearchErrorKind) -> Option<RecoveryGuard> {
        let mut state = self.state.lock();
        match *state {
            RecoveryState::Recovering { .. } => None,
            RecoveryState::Idle => {
                *state = RecoveryState::Recovering {
                    kind,
                    since: Utc::now(),
                };
                Some(RecoveryGuard {
                    state: Arc::clone(&self.state),
                })
            }
        }
    }
}

impl Default for RecoveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the tracker to idle when dropped
#[must_use]
pub struct RecoveryGuard {
    state: Arc<Mutex<RecoveryState>>,
}

impl Drop for RecoveryGuard {
    fn drop(&mut self) {
        *self.state.lock() = RecoveryState::Idle;
    }
}

/// What the dashboard shows about the most recent failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStatus {
    pub has_error: bool,
    pub error_kind: Option<SearchErrorKind>,
    pub can_recover: bool,
    pub recovery_actions: Vec<RecoveryAction>,
    pub is_recovering: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans() {
        assert_eq!(
            plan(SearchErrorKind::IndexCorrupt),
            &[RecoveryStep::Fallback, RecoveryStep::RebuildAndRetry]
        );
        assert_eq!(plan(SearchErrorKind::ConnectionError)[0], RecoveryStep::ReconnectAndRetry);
        assert_eq!(plan(SearchErrorKind::Timeout)[0], RecoveryStep::ReducedRetry);
        assert_eq!(plan(SearchErrorKind::Unknown), &[RecoveryStep::Fallback]);
        assert!(plan(SearchErrorKind::Validation).is_empty());
    }

    #[test]
    fn test_guard_prevents_nesting() {
        let tracker = RecoveryTracker::new();
        let guard = tracker.try_begin(SearchErrorKind::Timeout);
        assert!(guard.is_some());
        assert!(tracker.is_recovering());
        assert!(tracker.try_begin(SearchErrorKind::IndexError).is_none());

        drop(guard);
        assert_eq!(tracker.state(), RecoveryState::Idle);
        assert!(tracker.try_begin(SearchErrorKind::IndexError).is_some());
    }

    #[test]
    fn test_step_names() {
        assert_eq!(RecoveryStep::RebuildAndRetry.to_string(), "rebuild-and-retry");
    }
}
