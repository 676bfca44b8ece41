//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use kiosk_search::circuit_breaker::CircuitBreakerConfig;
use kiosk_search::db::{schema, ConnectionManager, ConnectionPool, PoolConfig, RecordStore};
use kiosk_search::models::{
    Photo, Profile, Publication, Record, RecordKind, SearchFilters, SearchOptions, SearchResponse,
    Staff,
};
use kiosk_search::monitor::MonitorConfig;
use kiosk_search::orchestrator::{EnhancedSearchManager, OrchestratorConfig, SearchComponents};
use kiosk_search::query::QueryBuilder;
use kiosk_search::search::{CacheStats, RankedSearch, SearchConfig};
use kiosk_search::{AppError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A temp-dir database with an open pool. Keep it alive for the test.
pub struct Fixture {
    pub dir: TempDir,
    pub pool: ConnectionPool,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_pool_config(PoolConfig::default()).await
    }

    pub async fn with_pool_config(config: PoolConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::open(
            ConnectionManager::new(dir.path().join("kiosk.sqlite3")),
            config,
        )
        .await
        .unwrap();
        Self { dir, pool }
    }

    /// Fixture pre-loaded with [`sample_records`]
    pub async fn seeded() -> Self {
        let fixture = Self::new().await;
        fixture.store().import(sample_records()).await.unwrap();
        fixture
    }

    pub fn store(&self) -> RecordStore {
        RecordStore::new(self.pool.clone())
    }

    pub fn components(&self) -> SearchComponents {
        SearchComponents::new(
            self.pool.clone(),
            QueryBuilder::default(),
            SearchConfig::default(),
        )
        .unwrap()
    }

    /// Drop the FTS table and triggers of `kind`
    pub async fn drop_index(&self, kind: RecordKind) {
        let mut conn = self.pool.acquire().await.unwrap();
        conn.interact(move |conn| schema::drop_index(conn, kind))
            .await
            .unwrap();
    }

    /// Run raw SQL on a pooled connection
    pub async fn execute(&self, sql: &str) {
        let sql = sql.to_string();
        let mut conn = self.pool.acquire().await.unwrap();
        conn.interact(move |conn| conn.execute_batch(&sql))
            .await
            .unwrap();
    }
}

/// Orchestrator settings that keep tests fast
pub fn fast_orchestrator() -> OrchestratorConfig {
    OrchestratorConfig::builder()
        .max_attempts(2)
        .retry_delay(Duration::from_millis(10))
        .rebuild_delay(Duration::from_millis(20))
        .build()
        .unwrap()
}

pub fn breaker_config(threshold: u32, cooldown: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .failure_threshold(threshold)
        .cooldown(cooldown)
        .build()
        .unwrap()
}

pub fn orchestrator(components: SearchComponents) -> EnhancedSearchManager {
    EnhancedSearchManager::new(
        components,
        fast_orchestrator(),
        breaker_config(5, Duration::from_secs(30)),
        MonitorConfig::default(),
    )
    .unwrap()
}

pub fn profile(first: &str, last: &str, year: i32, bio: &str) -> Record {
    Record::Profile(Profile {
        first_name: first.to_string(),
        last_name: last.to_string(),
        grad_year: Some(year),
        bio: Some(bio.to_string()),
        ..Default::default()
    })
}

/// A small archive touching every kind
pub fn sample_records() -> Vec<Record> {
    vec![
        profile("Grace", "Hopper", 1994, "Marched in the graduation parade"),
        profile("Ada", "Lovelace", 1991, "Captain of the debate team"),
        profile("Katherine", "Johnson", 2003, "Science fair winner"),
        Record::Profile(Profile {
            first_name: "Alan".into(),
            last_name: "Kay".into(),
            class_role: Some("Valedictorian".into()),
            grad_year: Some(1997),
            tags: vec!["honors".into(), "graduation".into()],
            ..Default::default()
        }),
        Record::Publication(Publication {
            title: "1994 Yearbook".into(),
            publication_type: "yearbook".into(),
            pub_date: Some("1994-06-01".into()),
            description: Some("Senior portraits and graduation coverage".into()),
            tags: vec!["seniors".into()],
            ..Default::default()
        }),
        Record::Publication(Publication {
            title: "Spring Newsletter".into(),
            publication_type: "newsletter".into(),
            pub_date: Some("2003-04-15".into()),
            description: Some("Science fair results and reunion dates".into()),
            ..Default::default()
        }),
        Record::Photo(Photo {
            title: "Graduation Day".into(),
            caption: Some("Caps in the air on the football field".into()),
            collection: Some("Ceremonies".into()),
            decade: Some("1990s".into()),
            tags: vec!["graduation".into(), "outdoors".into()],
            ..Default::default()
        }),
        Record::Photo(Photo {
            title: "Homecoming Parade".into(),
            caption: Some("The band leads the parade".into()),
            collection: Some("Events".into()),
            decade: Some("2000s".into()),
            ..Default::default()
        }),
        Record::Staff(Staff {
            full_name: "Alan Turing".into(),
            role: Some("Teacher".into()),
            department: Some("Mathematics".into()),
            bio: Some("Coached the chess club".into()),
            ..Default::default()
        }),
        Record::Staff(Staff {
            full_name: "Rosalind Franklin".into(),
            role: Some("Principal".into()),
            department: Some("Administration".into()),
            ..Default::default()
        }),
    ]
}

/// What a scripted engine call does
#[derive(Clone)]
pub enum Behavior {
    /// Delegate to the real engine
    Pass,
    /// Fail with a fresh copy of this error
    Fail(fn() -> AppError),
    /// Hang for this long, then delegate
    Stall(Duration),
}

/// Ranked engine wrapper whose search calls follow a script; once the
/// script runs out the last behavior repeats
pub struct ScriptedEngine {
    inner: Arc<dyn RankedSearch>,
    script: Mutex<Vec<Behavior>>,
    pub search_calls: AtomicUsize,
    pub reinit_calls: AtomicUsize,
    pub suggestion_failures: bool,
}

impl ScriptedEngine {
    pub fn new(inner: Arc<dyn RankedSearch>, script: Vec<Behavior>) -> Self {
        Self {
            inner,
            script: Mutex::new(script),
            search_calls: AtomicUsize::new(0),
            reinit_calls: AtomicUsize::new(0),
            suggestion_failures: false,
        }
    }

    /// Every search fails with `error`
    pub fn failing(inner: Arc<dyn RankedSearch>, error: fn() -> AppError) -> Self {
        let mut engine = Self::new(inner, vec![Behavior::Fail(error)]);
        engine.suggestion_failures = true;
        engine
    }

    pub fn calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Behavior {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script.first().cloned().unwrap_or(Behavior::Pass)
        }
    }
}

#[async_trait]
impl RankedSearch for ScriptedEngine {
    async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        match self.next() {
            Behavior::Pass => self.inner.search_all(query, filters, options).await,
            Behavior::Fail(error) => Err(error()),
            Behavior::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.search_all(query, filters, options).await
            }
        }
    }

    async fn search_kind(
        &self,
        kind: RecordKind,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        match self.next() {
            Behavior::Pass => self.inner.search_kind(kind, query, filters, options).await,
            Behavior::Fail(error) => Err(error()),
            Behavior::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.search_kind(kind, query, filters, options).await
            }
        }
    }

    async fn suggestions(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        if self.suggestion_failures {
            return Err(AppError::IndexUnavailable("suggestions".to_string()));
        }
        self.inner.suggestions(prefix, limit).await
    }

    async fn reinitialize(&self) -> Result<()> {
        self.reinit_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.reinitialize().await
    }

    async fn clear_cache(&self) {
        self.inner.clear_cache().await
    }

    async fn sweep_cache(&self) {
        self.inner.sweep_cache().await
    }

    fn cache_stats(&self) -> CacheStats {
        self.inner.cache_stats()
    }
}

pub fn index_error() -> AppError {
    AppError::IndexUnavailable("profiles_fts".to_string())
}

pub fn connection_error() -> AppError {
    AppError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    ))
}

pub fn timeout_error() -> AppError {
    AppError::Timeout("profile query exceeded 2s".to_string())
}

pub fn unknown_error() -> AppError {
    AppError::Internal("engine exploded".to_string())
}
