//! Maps low-level failures onto [`SearchErrorKind`]s.

use crate::db::PoolError;
use crate::error::AppError;
use crate::search::{SearchError, SearchErrorKind};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::ErrorCode;

lazy_static! {
    static ref CORRUPT_PATTERN: Regex =
        Regex::new(r"(?i)malformed|corrupt|not a database").expect("valid regex");
    static ref INDEX_PATTERN: Regex =
        Regex::new(r"(?i)no such (table|column)|fts5|vtable constructor|no such function: bm25")
            .expect("valid regex");
    static ref CONNECTION_PATTERN: Regex =
        Regex::new(r"(?i)database is (locked|busy)|unable to open|connection (closed|refused)")
            .expect("valid regex");
    static ref TIMEOUT_PATTERN: Regex =
        Regex::new(r"(?i)interrupted|timed? ?out").expect("valid regex");
    static ref RESOURCE_PATTERN: Regex =
        Regex::new(r"(?i)out of memory|disk is full|too many").expect("valid regex");
}

/// Classify an engine failure
pub fn classify(err: &AppError) -> SearchErrorKind {
    match err {
        AppError::Search(e) => e.kind,
        AppError::Validation(_) => SearchErrorKind::Validation,
        AppError::Timeout(_) => SearchErrorKind::Timeout,
        AppError::IndexCorrupt(_) => SearchErrorKind::IndexCorrupt,
        AppError::IndexUnavailable(_) => SearchErrorKind::IndexError,
        AppError::ResourceExhausted(_) => SearchErrorKind::ResourceExhaustion,
        AppError::CircuitOpen(_) => SearchErrorKind::ConnectionError,
        AppError::Pool(PoolError::AcquireTimeout(_)) => SearchErrorKind::ResourceExhaustion,
        AppError::Pool(_) => SearchErrorKind::ConnectionError,
        AppError::Database(e) => classify_sqlite(e),
        other => classify_message(&other.to_string()),
    }
}

fn classify_sqlite(err: &rusqlite::Error) -> SearchErrorKind {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            SearchErrorKind::IndexCorrupt
        }
        Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::CannotOpen) => SearchErrorKind::ConnectionError,
        Some(ErrorCode::OperationInterrupted) => SearchErrorKind::Timeout,
        Some(ErrorCode::OutOfMemory) | Some(ErrorCode::DiskFull) => {
            SearchErrorKind::ResourceExhaustion
        }
        _ => classify_message(&err.to_string()),
    }
}

/// Classify by message text, for errors without a usable code
pub fn classify_message(message: &str) -> SearchErrorKind {
    if CORRUPT_PATTERN.is_match(message) {
        SearchErrorKind::IndexCorrupt
    } else if INDEX_PATTERN.is_match(message) {
        SearchErrorKind::IndexError
    } else if CONNECTION_PATTERN.is_match(message) {
        SearchErrorKind::ConnectionError
    } else if TIMEOUT_PATTERN.is_match(message) {
        SearchErrorKind::Timeout
    } else if RESOURCE_PATTERN.is_match(message) {
        SearchErrorKind::ResourceExhaustion
    } else {
        SearchErrorKind::Unknown
    }
}

/// Wrap `err` as a typed [`SearchError`] for `query`
pub fn to_search_error(err: &AppError, query: &str) -> SearchError {
    if let AppError::Search(e) = err {
        return e.clone().with_query(query);
    }
    SearchError::new(classify(err), err.to_string()).with_query(query)
}
