//! Resilient full-text search over alumni profiles, publications, photos
//! and staff records, backed by SQLite FTS5.

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod query;
pub mod search;

pub use error::{AppError, Result};
pub use orchestrator::{EnhancedSearchManager, SearchComponents};
