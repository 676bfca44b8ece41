//! Ranked search across the four record kinds.

use crate::db::ConnectionPool;
use crate::error::{AppError, Result};
use crate::metrics::{record_search, SEARCH_KIND_DEGRADATIONS_TOTAL};
use crate::models::{
    paginate, sort_results, RecordKind, ResultSource, SearchFilters, SearchOptions,
    SearchResponse, SearchResult,
};
use crate::query::{BuildOptions, QueryBuilder};
use crate::search::cache::{cache_key, CacheStats, ResultCache};
use crate::search::config::SearchConfig;
use crate::search::fallback;
use crate::search::kinds::{self, FilterClause};
use crate::search::snippet::attach_snippets;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The ranked search engine as seen by the orchestrator
#[async_trait]
pub trait RankedSearch: Send + Sync {
    /// Search every kind and merge
    async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse>;

    /// Search a single kind
    async fn search_kind(
        &self,
        kind: RecordKind,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse>;

    /// Title/name completions for a prefix
    async fn suggestions(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Drop every engine handle and reconnect
    async fn reinitialize(&self) -> Result<()>;

    async fn clear_cache(&self);

    /// Evict expired cache entries
    async fn sweep_cache(&self);

    fn cache_stats(&self) -> CacheStats;
}

enum KindQuery {
    Ranked(String),
    Browse,
}

struct KindOutcome {
    kind: RecordKind,
    results: Vec<SearchResult>,
    degraded: bool,
}

/// FTS5-backed search with a short-TTL response cache
pub struct SearchManager {
    pool: ConnectionPool,
    builder: QueryBuilder,
    cache: ResultCache,
    config: SearchConfig,
}

impl SearchManager {
    pub fn new(pool: ConnectionPool, builder: QueryBuilder, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let cache = ResultCache::new("search", config.cache_capacity, config.cache_ttl);
        Ok(Self {
            pool,
            builder,
            cache,
            config,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Limit clamped to the ceiling; 0 means the default
    fn normalize(&self, options: &SearchOptions) -> SearchOptions {
        let mut options = options.clamped(self.config.max_limit);
        if options.limit == 0 {
            options.limit = self.config.default_limit;
        }
        options
    }

    async fn run(
        &self,
        scope: &str,
        kinds: &[RecordKind],
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let options = self.normalize(options);
        let key = cache_key(scope, query, filters, &options);

        if let Some(cached) = self.cache.get(&key).await {
            record_search("cached", "success", started.elapsed());
            debug!(scope, query = %query, "Serving search from cache");
            return Ok(cached);
        }

        let validation = self.builder.validate(query);
        if !validation.is_valid {
            record_search("ranked", "rejected", started.elapsed());
            return Err(AppError::Validation(
                validation
                    .reason
                    .unwrap_or_else(|| "invalid query".to_string()),
            ));
        }

        let (mode, terms, excluded, source) = if query.trim().is_empty() {
            if filters.is_empty() {
                return Ok(SearchResponse::empty(
                    query,
                    ResultSource::Browse,
                    options.offset,
                    options.limit,
                ));
            }
            (KindQuery::Browse, Vec::new(), Vec::new(), ResultSource::Browse)
        } else {
            match self.builder.build(query, BuildOptions::default()) {
                Some(built) => (
                    KindQuery::Ranked(built.expression),
                    built.terms,
                    built.excluded,
                    ResultSource::Ranked,
                ),
                None => {
                    return Ok(SearchResponse::empty(
                        query,
                        ResultSource::Ranked,
                        options.offset,
                        options.limit,
                    ))
                }
            }
        };

        let applicable: Vec<RecordKind> = kinds
            .iter()
            .copied()
            .filter(|kind| filters.applies_to(*kind))
            .collect();
        if applicable.is_empty() {
            return Ok(SearchResponse::empty(query, source, options.offset, options.limit));
        }
        let share = (options.offset + options.limit).div_ceil(applicable.len());

        let outcomes = join_all(applicable.iter().map(|kind| {
            self.query_kind(*kind, &mode, &terms, &excluded, filters, share, options.allow_fallback)
        }))
        .await;

        let path = source.to_string();
        let mut collected = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => collected.push(outcome),
                Err(e) => {
                    record_search(&path, "error", started.elapsed());
                    return Err(e);
                }
            }
        }
        let degraded_kinds: Vec<RecordKind> = collected
            .iter()
            .filter(|o| o.degraded)
            .map(|o| o.kind)
            .collect();
        if !degraded_kinds.is_empty() {
            rescale_ranked(&mut collected);
        }
        let mut merged: Vec<SearchResult> =
            collected.into_iter().flat_map(|o| o.results).collect();

        sort_results(&mut merged, options.sort, options.direction);
        let total_hits = merged.len();
        let page = paginate(merged, options.offset, options.limit);
        let results = attach_snippets(page, &terms, self.config.snippet_max_chars);

        let elapsed = started.elapsed();
        let response = SearchResponse {
            results,
            total_hits,
            query: query.to_string(),
            source,
            cache_hit: false,
            degraded_kinds,
            search_time_ms: elapsed.as_millis() as u64,
            offset: options.offset,
            limit: options.limit,
        };

        if response.degraded_kinds.is_empty() {
            self.cache.insert(key, &response).await;
            record_search(&path, "success", elapsed);
        } else {
            record_search(&path, "degraded", elapsed);
        }

        debug!(
            scope,
            query = %query,
            total_hits,
            elapsed_ms = response.search_time_ms,
            "Search completed"
        );
        Ok(response)
    }

    async fn query_kind(
        &self,
        kind: RecordKind,
        mode: &KindQuery,
        terms: &[String],
        excluded: &[String],
        filters: &SearchFilters,
        fetch: usize,
        allow_fallback: bool,
    ) -> Result<KindOutcome> {
        let Some(filter) = FilterClause::for_kind(kind, filters) else {
            return Ok(KindOutcome {
                kind,
                results: Vec::new(),
                degraded: false,
            });
        };
        let deadline = self.config.query_timeout;

        let mut conn = self.pool.acquire().await?;
        let primary = match mode {
            KindQuery::Ranked(expression) => {
                let expression = expression.clone();
                conn.interact_with_timeout(deadline, move |conn| {
                    kinds::ranked(conn, kind, &expression, &filter, fetch)
                })
                .await
                .map(|rows| {
                    rows.into_iter()
                        .map(|(record, score)| SearchResult::from_record(record, score))
                        .collect::<Vec<_>>()
                })
            }
            KindQuery::Browse => conn
                .interact_with_timeout(deadline, move |conn| {
                    kinds::browse(conn, kind, &filter, fetch)
                })
                .await
                .map(|rows| {
                    rows.into_iter()
                        .map(|record| SearchResult::from_record(record, 0.0))
                        .collect::<Vec<_>>()
                }),
        };
        drop(conn);

        match primary {
            Ok(results) => Ok(KindOutcome {
                kind,
                results,
                degraded: false,
            }),
            Err(e) if allow_fallback && matches!(mode, KindQuery::Ranked(_)) && !terms.is_empty() => {
                warn!(kind = %kind, error = %e, "Ranked query failed, scanning base table instead");
                SEARCH_KIND_DEGRADATIONS_TOTAL
                    .with_label_values(&[kind.as_ref()])
                    .inc();

                let mut conn = self.pool.acquire().await?;
                let terms = terms.to_vec();
                let excluded = excluded.to_vec();
                let filters = filters.clone();
                let results = conn
                    .interact_with_timeout(deadline, move |conn| {
                        fallback::scan_kind(conn, kind, &terms, &excluded, &filters)
                    })
                    .await?;
                Ok(KindOutcome {
                    kind,
                    results,
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Search every kind and merge
    pub async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        self.run("all", &RecordKind::all(), query, filters, options)
            .await
    }

    /// Search a single kind
    pub async fn search_kind(
        &self,
        kind: RecordKind,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        self.run(kind.as_ref(), &[kind], query, filters, options)
            .await
    }

    /// Title/name completions for `prefix`, interleaved across kinds and
    /// deduplicated case-insensitively
    pub async fn get_search_suggestions(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let limit = if limit == 0 {
            self.config.suggestion_limit
        } else {
            limit
        };
        let words: Vec<String> = prefix
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        let per_kind = conn
            .interact_with_timeout(self.config.query_timeout, move |conn| {
                RecordKind::all()
                    .into_iter()
                    .map(|kind| kinds::title_suggestions(conn, kind, &words, limit))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        let mut seen = HashSet::new();
        let mut suggestions = Vec::with_capacity(limit);
        let longest = per_kind.iter().map(Vec::len).max().unwrap_or(0);
        'outer: for i in 0..longest {
            for list in &per_kind {
                if let Some(title) = list.get(i) {
                    if seen.insert(title.to_lowercase()) {
                        suggestions.push(title.clone());
                        if suggestions.len() >= limit {
                            break 'outer;
                        }
                    }
                }
            }
        }
        Ok(suggestions)
    }

    /// Discard every pooled connection, reconnect and drop cached responses
    pub async fn reinitialize(&self) -> Result<()> {
        self.pool.reset();
        let opened = self.pool.warm_up().await?;
        self.cache.clear().await;
        info!(connections = opened, "Search engine reinitialized");
        Ok(())
    }
}

/// Put ranked scores on the fallback scale so a partially degraded
/// response can be merged: the best ranked hit becomes 100 and the rest
/// keep their proportion to it
fn rescale_ranked(outcomes: &mut [KindOutcome]) {
    let best = outcomes
        .iter()
        .filter(|o| !o.degraded)
        .flat_map(|o| o.results.iter().map(|r| r.relevance))
        .fold(0.0_f64, f64::max);
    if best <= 0.0 {
        return;
    }
    for outcome in outcomes.iter_mut().filter(|o| !o.degraded) {
        for result in &mut outcome.results {
            result.relevance = (result.relevance / best * 100.0).clamp(0.0, 100.0);
        }
    }
}

#[async_trait]
impl RankedSearch for SearchManager {
    async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        SearchManager::search_all(self, query, filters, options).await
    }

    async fn search_kind(
        &self,
        kind: RecordKind,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        SearchManager::search_kind(self, kind, query, filters, options).await
    }

    async fn suggestions(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.get_search_suggestions(prefix, limit).await
    }

    async fn reinitialize(&self) -> Result<()> {
        SearchManager::reinitialize(self).await
    }

    async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn sweep_cache(&self) {
        self.cache.sweep().await;
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
