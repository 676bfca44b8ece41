//! Classified search failures.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Failure categories that drive recovery
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SearchErrorKind {
    IndexError,
    IndexCorrupt,
    ConnectionError,
    Timeout,
    ResourceExhaustion,
    Validation,
    Unknown,
}

impl SearchErrorKind {
    /// Everything except validation failures may be retried
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SearchErrorKind::Validation)
    }

    /// Recommended actions, most preferred first
    pub fn default_actions(&self) -> Vec<RecoveryAction> {
        use RecoveryAction::*;
        match self {
            SearchErrorKind::IndexError | SearchErrorKind::IndexCorrupt => {
                vec![UseFallback, RebuildIndex, RestoreSnapshot]
            }
            SearchErrorKind::ConnectionError => vec![Reconnect, RetryWithBackoff, UseCachedResults],
            SearchErrorKind::Timeout => vec![SimplifyQuery, ReduceLimit, UseFallback],
            SearchErrorKind::ResourceExhaustion => {
                vec![ClearCache, ReduceComplexity, ReleaseResources]
            }
            SearchErrorKind::Validation => vec![LogFailure, RejectQuery, RaiseAlert],
            SearchErrorKind::Unknown => vec![Retry, UseFallback],
        }
    }
}

/// Remediation steps attached to a [`SearchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RecoveryAction {
    UseFallback,
    RebuildIndex,
    RestoreSnapshot,
    Reconnect,
    RetryWithBackoff,
    UseCachedResults,
    SimplifyQuery,
    ReduceLimit,
    ClearCache,
    ReduceComplexity,
    ReleaseResources,
    LogFailure,
    RejectQuery,
    RaiseAlert,
    Retry,
}

/// A classified search failure surfaced to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} search failure: {message}")]
pub struct SearchError {
    pub kind: SearchErrorKind,
    pub message: String,
    pub recoverable: bool,
    pub actions: Vec<RecoveryAction>,
    pub query: Option<String>,
    /// Recovery cycles spent before giving up
    pub attempts: u32,
}

impl SearchError {
    pub fn new(kind: SearchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind.is_recoverable(),
            actions: kind.default_actions(),
            query: None,
            attempts: 0,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Plain-language message with a suggested next step, for the kiosk UI
    pub fn user_message(&self) -> String {
        match self.kind {
            SearchErrorKind::Validation => {
                "That search couldn't be understood. Try removing quotes or special characters."
                    .to_string()
            }
            SearchErrorKind::Timeout => {
                "The search took too long. Try fewer or more specific words.".to_string()
            }
            SearchErrorKind::IndexError | SearchErrorKind::IndexCorrupt => {
                "Search is being repaired. Please try again in a moment.".to_string()
            }
            SearchErrorKind::ConnectionError => {
                "The archive is temporarily unavailable. Please try again shortly.".to_string()
            }
            SearchErrorKind::ResourceExhaustion => {
                "The kiosk is busy right now. Please try again shortly.".to_string()
            }
            SearchErrorKind::Unknown => {
                "Something went wrong with that search. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_kebab_case() {
        assert_eq!(SearchErrorKind::IndexCorrupt.to_string(), "index-corrupt");
        assert_eq!(
            "resource-exhaustion".parse::<SearchErrorKind>().unwrap(),
            SearchErrorKind::ResourceExhaustion
        );
        assert_eq!(RecoveryAction::UseFallback.to_string(), "use-fallback");
    }

    #[test]
    fn test_validation_is_not_recoverable() {
        let err = SearchError::new(SearchErrorKind::Validation, "unmatched quote");
        assert!(!err.recoverable);
        assert_eq!(err.actions[0], RecoveryAction::LogFailure);

        let err = SearchError::new(SearchErrorKind::Unknown, "boom");
        assert!(err.recoverable);
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = SearchError::new(SearchErrorKind::IndexCorrupt, "database disk image is malformed")
            .with_query("reunion")
            .with_attempts(3);
        assert!(!err.user_message().contains("malformed"));
        assert!(err.to_string().contains("index-corrupt"));
        assert_eq!(err.attempts, 3);
    }
}
