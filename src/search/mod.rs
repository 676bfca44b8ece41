//! Full-text search over the kiosk archive, backed by SQLite FTS5
//!
//! This module provides:
//!
//! - **Ranked Search**: bm25-ranked queries per record kind, merged across kinds
//! - **Filter Browsing**: filter-only listings when the query is empty
//! - **Fallback Search**: substring search that works without any index
//! - **Index Lifecycle**: rebuild, integrity check, repair and compaction
//! - **Result Caching**: short-TTL response cache keyed by query, filters and options
//! - **Snippets**: word-aligned excerpts around the first matched term
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           SearchManager (RankedSearch)          │
//! │  - search_all()     - search_kind()             │
//! │  - get_search_suggestions()  - reinitialize()   │
//! └─────────────────────────────────────────────────┘
//!          │ per kind, concurrently          │ on per-kind failure
//!          ▼                                 ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  FTS5 tables (bm25)      │   │  substring scan (fallback)│
//! └──────────────────────────┘   └──────────────────────────┘
//!          │                                 │
//!          └──────────── ConnectionPool ─────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kiosk_search::db::{ConnectionManager, ConnectionPool, PoolConfig};
//! use kiosk_search::models::{SearchFilters, SearchOptions};
//! use kiosk_search::query::QueryBuilder;
//! use kiosk_search::search::{SearchConfig, SearchManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = ConnectionPool::open(
//!         ConnectionManager::new("./data/kiosk.sqlite3"),
//!         PoolConfig::default(),
//!     )
//!     .await?;
//!     let search = SearchManager::new(pool, QueryBuilder::default(), SearchConfig::default())?;
//!
//!     let filters = SearchFilters::new().with_year_range(1990, 1999);
//!     let options = SearchOptions::new().with_limit(20);
//!     let results = search.search_all("reunion", &filters, &options).await?;
//!     println!("Found {} records", results.total_hits);
//!
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
pub mod fallback;
mod index;
pub mod kinds;
mod manager;
pub mod snippet;

pub use cache::{cache_key, CacheStats, ResultCache};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use error::{RecoveryAction, SearchError, SearchErrorKind};
pub use fallback::FallbackSearchManager;
pub use index::{IndexManager, IndexStats, OptimizeOutcome, MAX_COUNT_DRIFT};
pub use manager::{RankedSearch, SearchManager};
pub use snippet::{make_snippet, Snippet};
