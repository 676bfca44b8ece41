//! TTL cache of search responses.

use crate::metrics::CACHE_LOOKUPS_TOTAL;
use crate::models::{SearchFilters, SearchOptions, SearchResponse};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hit/miss counters of a [`ResultCache`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

/// Deterministic key over scope, query, filters and options
pub fn cache_key(
    scope: &str,
    query: &str,
    filters: &SearchFilters,
    options: &SearchOptions,
) -> String {
    serde_json::to_string(&(scope, query.trim(), filters, options))
        .unwrap_or_else(|_| format!("{}|{}", scope, query.trim()))
}

/// Response cache; entries older than the TTL are never returned
#[derive(Clone)]
pub struct ResultCache {
    name: &'static str,
    ttl: Duration,
    cache: Cache<String, Arc<SearchResponse>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ResultCache {
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .name(name)
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            name,
            ttl,
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cached response with `cache_hit` set
    pub async fn get(&self, key: &str) -> Option<SearchResponse> {
        match self.cache.get(key).await {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                CACHE_LOOKUPS_TOTAL.with_label_values(&[self.name, "hit"]).inc();
                debug!(cache = self.name, "Cache hit");
                let mut response = (*response).clone();
                response.cache_hit = true;
                Some(response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CACHE_LOOKUPS_TOTAL.with_label_values(&[self.name, "miss"]).inc();
                None
            }
        }
    }

    pub async fn insert(&self, key: String, response: &SearchResponse) {
        self.cache.insert(key, Arc::new(response.clone())).await;
    }

    /// Evict expired entries now instead of lazily
    pub async fn sweep(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            name: self.name.to_string(),
            entries: self.entry_count(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
