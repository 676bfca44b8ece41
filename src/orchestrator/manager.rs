//! The resilient search front door.

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitBreakerStats,
};
use crate::db::{ConnectionPool, PoolMetrics, RecordStore};
use crate::error::{AppError, Result};
use crate::metrics::{record_search, RECOVERY_ATTEMPTS_TOTAL};
use crate::models::{RecordKind, ResultSource, SearchFilters, SearchOptions, SearchResponse};
use crate::monitor::{MonitorConfig, PerformanceMonitor, PerformanceSnapshot};
use crate::orchestrator::classify::{classify, to_search_error};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::health::{
    HealthIssue, HealthIssueKind, HealthStatus, HealthTracker, Severity,
};
use crate::orchestrator::recovery::{plan, RecoveryStatus, RecoveryStep, RecoveryTracker};
use crate::query::QueryBuilder;
use crate::search::{
    cache_key, CacheStats, FallbackSearchManager, IndexManager, IndexStats, OptimizeOutcome,
    RankedSearch, ResultCache, SearchConfig, SearchError, SearchErrorKind, SearchManager,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Domain terms offered when title suggestions are unavailable
pub const STATIC_SUGGESTIONS: &[&str] = &[
    "alumni",
    "athletics",
    "awards",
    "band",
    "choir",
    "class of",
    "commencement",
    "debate",
    "faculty",
    "football",
    "graduation",
    "hall of fame",
    "homecoming",
    "newsletter",
    "prom",
    "reunion",
    "science fair",
    "staff",
    "theater",
    "yearbook",
];

/// Static terms starting with `prefix`, case-insensitive
pub fn static_suggestions(prefix: &str, limit: usize) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    STATIC_SUGGESTIONS
        .iter()
        .filter(|term| term.starts_with(&prefix))
        .take(limit)
        .map(|term| term.to_string())
        .collect()
}

/// The pieces the orchestrator drives
pub struct SearchComponents {
    pub engine: Arc<dyn RankedSearch>,
    pub fallback: FallbackSearchManager,
    pub index: IndexManager,
    pub pool: ConnectionPool,
    pub builder: QueryBuilder,
    pub search: SearchConfig,
}

impl SearchComponents {
    /// Wire the FTS5 engine, fallback and index manager over one pool
    pub fn new(pool: ConnectionPool, builder: QueryBuilder, search: SearchConfig) -> Result<Self> {
        let engine = SearchManager::new(pool.clone(), builder.clone(), search.clone())?;
        Ok(Self {
            engine: Arc::new(engine),
            fallback: FallbackSearchManager::new(
                pool.clone(),
                builder.clone(),
                search.snippet_max_chars,
            ),
            index: IndexManager::new(pool.clone()),
            pool,
            builder,
            search,
        })
    }

    /// Replace the ranked engine
    pub fn with_engine(mut self, engine: Arc<dyn RankedSearch>) -> Self {
        self.engine = engine;
        self
    }
}

/// Ranked search guarded by a circuit breaker, classified recovery and
/// health tracking.
///
/// Callers always get either results (possibly degraded) or an
/// [`AppError::Search`] carrying a classified [`SearchError`].
pub struct EnhancedSearchManager {
    engine: Arc<dyn RankedSearch>,
    fallback: FallbackSearchManager,
    index: IndexManager,
    pool: ConnectionPool,
    builder: QueryBuilder,
    search: SearchConfig,
    config: OrchestratorConfig,
    breaker: CircuitBreaker,
    last_good: ResultCache,
    monitor: Arc<PerformanceMonitor>,
    health: HealthTracker,
    recovery: RecoveryTracker,
    last_error: Mutex<Option<SearchError>>,
    rebuild_pending: Arc<AtomicBool>,
}

impl EnhancedSearchManager {
    pub fn new(
        components: SearchComponents,
        config: OrchestratorConfig,
        breaker: CircuitBreakerConfig,
        monitor: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        breaker.validate()?;
        components.search.validate()?;

        info!(
            max_attempts = config.max_attempts,
            failure_threshold = breaker.failure_threshold,
            "Creating search orchestrator"
        );

        Ok(Self {
            engine: components.engine,
            fallback: components.fallback,
            index: components.index,
            pool: components.pool,
            builder: components.builder,
            search: components.search,
            breaker: CircuitBreaker::new("ranked-search", breaker),
            last_good: ResultCache::new(
                "last_good",
                config.last_good_capacity,
                config.last_good_ttl,
            ),
            monitor: Arc::new(PerformanceMonitor::new(monitor)),
            health: HealthTracker::new(config.health.clone()),
            recovery: RecoveryTracker::new(),
            last_error: Mutex::new(None),
            rebuild_pending: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Search every kind, recovering from engine failures
    pub async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let span = info_span!("search", search_id = %Uuid::new_v4());
        self.search_all_inner(query, filters, options)
            .instrument(span)
            .await
    }

    async fn search_all_inner(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let validation = self.builder.validate(query);
        if !validation.is_valid {
            let reason = validation
                .reason
                .unwrap_or_else(|| "invalid query".to_string());
            warn!(query = %query, reason = %reason, "Rejected search");
            let error = SearchError::new(SearchErrorKind::Validation, reason).with_query(query);
            *self.last_error.lock() = Some(error.clone());
            return Err(AppError::Search(error));
        }

        let tracker = self.monitor.start("search_all");
        let started = Instant::now();
        let options = self.normalize(options);
        let key = cache_key("last_good", query, filters, &options);

        let result = match self.breaker.permit() {
            Err(open) => {
                debug!(query = %query, reason = %open, "Serving search with circuit open");
                self.short_circuit(&key, query, filters, &options).await
            }
            Ok(permit) => match self.engine.search_all(query, filters, &options).await {
                Ok(response) => {
                    permit.success();
                    self.accept(&key, &response).await;
                    Ok(response)
                }
                Err(e) => {
                    let kind = classify(&e);
                    if kind == SearchErrorKind::Validation {
                        permit.neutral();
                        Err(self.fail(&e, query, 0))
                    } else {
                        permit.failure();
                        warn!(error_kind = %kind, query = %query, error = %e, "Ranked search failed");
                        self.recover(kind, e, &key, query, filters, &options).await
                    }
                }
            },
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(response) => {
                self.health.record(elapsed, true, response.cache_hit);
                let _ = tracker.success();
            }
            Err(AppError::Search(error)) if error.kind == SearchErrorKind::Validation => {
                tracker.discard();
            }
            Err(_) => {
                self.health.record(elapsed, false, false);
                let _ = tracker.error();
            }
        }
        result
    }

    fn normalize(&self, options: &SearchOptions) -> SearchOptions {
        let mut options = options.clamped(self.search.max_limit);
        if options.limit == 0 {
            options.limit = self.search.default_limit;
        }
        options
    }

    /// Bookkeeping after the ranked path answered
    async fn accept(&self, key: &str, response: &SearchResponse) {
        if response.is_degraded() {
            self.schedule_rebuild();
        } else {
            *self.last_error.lock() = None;
            self.last_good.insert(key.to_string(), response).await;
        }
    }

    async fn short_circuit(
        &self,
        key: &str,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        if let Some(mut cached) = self.last_good.get(key).await {
            cached.source = ResultSource::ShortCircuit;
            record_search("short_circuit", "cached", started.elapsed());
            return Ok(cached);
        }
        if !options.allow_fallback {
            return Err(self.fail(&AppError::CircuitOpen(self.breaker.name().to_string()), query, 0));
        }

        match self.fallback.search_all(query, filters, options).await {
            Ok(mut response) => {
                response.source = ResultSource::ShortCircuit;
                record_search("short_circuit", "fallback", started.elapsed());
                Ok(response)
            }
            Err(e) => Err(self.fail(&e, query, 0)),
        }
    }

    /// Dispatch the recovery plan for `kind`, cycling up to `max_attempts`
    async fn recover(
        &self,
        mut kind: SearchErrorKind,
        first: AppError,
        key: &str,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let Some(_guard) = self.recovery.try_begin(kind) else {
            debug!(error_kind = %kind, query = %query, "Recovery already running, using fallback");
            if !options.allow_fallback {
                return Err(self.fail(&first, query, 0));
            }
            return match self.fallback.search_all(query, filters, options).await {
                Ok(response) => Ok(response),
                Err(e) => Err(self.fail(&e, query, 1)),
            };
        };

        let mut last_error = first;
        let mut attempts = 0;
        'cycles: for attempt in 1..=self.config.max_attempts {
            attempts = attempt;
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
                match self.engine.search_all(query, filters, options).await {
                    Ok(response) => {
                        info!(query = %query, attempt, "Ranked search recovered");
                        self.accept(key, &response).await;
                        return Ok(response);
                    }
                    Err(e) => {
                        kind = classify(&e);
                        last_error = e;
                        if kind == SearchErrorKind::Validation {
                            break 'cycles;
                        }
                    }
                }
            }

            for step in plan(kind) {
                if *step == RecoveryStep::Fallback && !options.allow_fallback {
                    continue;
                }
                info!(
                    error_kind = %kind,
                    query = %query,
                    attempt,
                    strategy = %step,
                    "Attempting recovery"
                );
                match self.apply(*step, query, filters, options).await {
                    Ok(response) => {
                        RECOVERY_ATTEMPTS_TOTAL
                            .with_label_values(&[&kind.to_string(), &step.to_string(), "success"])
                            .inc();
                        match step {
                            RecoveryStep::RebuildAndRetry | RecoveryStep::ReconnectAndRetry => {
                                self.accept(key, &response).await;
                            }
                            RecoveryStep::Fallback | RecoveryStep::ReducedRetry => {
                                if *step == RecoveryStep::Fallback
                                    && matches!(
                                        kind,
                                        SearchErrorKind::IndexError | SearchErrorKind::IndexCorrupt
                                    )
                                {
                                    self.schedule_rebuild();
                                }
                                *self.last_error.lock() =
                                    Some(to_search_error(&last_error, query).with_attempts(attempt));
                            }
                        }
                        return Ok(response);
                    }
                    Err(e) => {
                        RECOVERY_ATTEMPTS_TOTAL
                            .with_label_values(&[&kind.to_string(), &step.to_string(), "failure"])
                            .inc();
                        warn!(
                            error_kind = %kind,
                            query = %query,
                            attempt,
                            strategy = %step,
                            error = %e,
                            "Recovery step failed"
                        );
                        last_error = e;
                    }
                }
            }
        }

        let error = to_search_error(&last_error, query).with_attempts(attempts);
        error!(
            error_kind = %error.kind,
            query = %query,
            attempts,
            "Search recovery exhausted"
        );
        *self.last_error.lock() = Some(error.clone());
        Err(AppError::Search(error))
    }

    async fn apply(
        &self,
        step: RecoveryStep,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        match step {
            RecoveryStep::Fallback => self.fallback.search_all(query, filters, options).await,
            RecoveryStep::RebuildAndRetry => {
                self.index.rebuild_indexes(None).await?;
                self.engine.clear_cache().await;
                self.engine.search_all(query, filters, options).await
            }
            RecoveryStep::ReconnectAndRetry => {
                self.engine.reinitialize().await?;
                self.engine.search_all(query, filters, options).await
            }
            RecoveryStep::ReducedRetry => {
                let reduced = self.builder.build_reduced(query).ok_or_else(|| {
                    AppError::Validation("query has no searchable terms".to_string())
                })?;
                let first = reduced.terms.first().cloned().unwrap_or_default();
                let reduced_query = if first.contains(' ') {
                    format!("\"{}\"", first)
                } else {
                    first
                };
                let mut reduced_options = options.clone();
                reduced_options.limit = options.limit.min(self.config.reduced_limit);
                self.engine
                    .search_all(&reduced_query, filters, &reduced_options)
                    .await
            }
        }
    }

    /// Record and wrap a failure for the caller
    fn fail(&self, err: &AppError, query: &str, attempts: u32) -> AppError {
        let error = to_search_error(err, query).with_attempts(attempts);
        *self.last_error.lock() = Some(error.clone());
        AppError::Search(error)
    }

    /// Rebuild every index after `rebuild_delay` unless one is already pending
    fn schedule_rebuild(&self) {
        if self.rebuild_pending.swap(true, Ordering::SeqCst) {
            debug!("Index rebuild already scheduled");
            return;
        }

        let index = self.index.clone();
        let engine = Arc::clone(&self.engine);
        let pending = Arc::clone(&self.rebuild_pending);
        let delay = self.config.rebuild_delay;
        info!(delay_ms = delay.as_millis() as u64, "Scheduling background index rebuild");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match index.rebuild_indexes(None).await {
                Ok(()) => {
                    engine.clear_cache().await;
                    info!("Background index rebuild finished");
                }
                Err(e) => error!(error = %e, "Background index rebuild failed"),
            }
            pending.store(false, Ordering::SeqCst);
        });
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending.load(Ordering::SeqCst)
    }

    /// Title completions, or static domain terms when the engine can't answer
    pub async fn get_search_suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        let limit = if limit == 0 {
            self.search.suggestion_limit
        } else {
            limit
        };
        let tracker = self.monitor.start("suggestions");

        if self.breaker.state() == CircuitBreakerState::Open {
            let _ = tracker.success();
            return static_suggestions(prefix, limit);
        }

        match self.engine.suggestions(prefix, limit).await {
            Ok(suggestions) => {
                let _ = tracker.success();
                suggestions
            }
            Err(e) => {
                let _ = tracker.error();
                warn!(prefix = %prefix, error = %e, "Suggestions failed, using static terms");
                static_suggestions(prefix, limit)
            }
        }
    }

    pub async fn rebuild_indexes(&self, kinds: Option<Vec<RecordKind>>) -> Result<()> {
        let tracker = self.monitor.start("rebuild_indexes");
        match self.index.rebuild_indexes(kinds).await {
            Ok(()) => {
                self.engine.clear_cache().await;
                let _ = tracker.success();
                Ok(())
            }
            Err(e) => {
                let _ = tracker.error();
                Err(e)
            }
        }
    }

    pub async fn verify_integrity(&self) -> Result<Vec<IndexStats>> {
        self.index.verify_integrity().await
    }

    pub async fn repair_corrupted_indexes(&self) -> Result<Vec<String>> {
        let tracker = self.monitor.start("repair_indexes");
        match self.index.repair_corrupted_indexes().await {
            Ok(actions) => {
                self.engine.clear_cache().await;
                let _ = tracker.success();
                Ok(actions)
            }
            Err(e) => {
                let _ = tracker.error();
                Err(e)
            }
        }
    }

    pub async fn optimize_indexes(&self) -> Result<Vec<OptimizeOutcome>> {
        self.index.optimize_indexes().await
    }

    /// Copy of the whole store
    pub async fn export_snapshot(&self) -> Result<Vec<u8>> {
        RecordStore::new(self.pool.clone()).export_snapshot().await
    }

    /// Replace the whole store and drop everything cached from the old one
    pub async fn restore_snapshot(&self, bytes: Vec<u8>) -> Result<()> {
        RecordStore::new(self.pool.clone())
            .import_snapshot(bytes)
            .await?;
        self.engine.reinitialize().await?;
        self.last_good.clear().await;
        *self.last_error.lock() = None;
        info!("Snapshot restored, caches cleared");
        Ok(())
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let mut extra = Vec::new();

        if self.breaker.state() == CircuitBreakerState::Open {
            extra.push(HealthIssue {
                kind: HealthIssueKind::CircuitOpen,
                severity: Severity::Critical,
                message: "ranked search is short-circuited".to_string(),
                auto_fixable: true,
            });
        }

        if let Some(error) = self.last_error.lock().as_ref() {
            let severity = match error.kind {
                SearchErrorKind::IndexCorrupt => Severity::Critical,
                SearchErrorKind::IndexError | SearchErrorKind::ConnectionError => Severity::High,
                SearchErrorKind::Timeout
                | SearchErrorKind::ResourceExhaustion
                | SearchErrorKind::Unknown => Severity::Medium,
                SearchErrorKind::Validation => Severity::Low,
            };
            extra.push(HealthIssue {
                kind: HealthIssueKind::LastSearchFailed,
                severity,
                message: error.message.clone(),
                auto_fixable: error.recoverable,
            });
        }

        self.health.status(extra)
    }

    pub fn get_recovery_status(&self) -> RecoveryStatus {
        let last_error = self.last_error.lock().clone();
        RecoveryStatus {
            has_error: last_error.is_some(),
            error_kind: last_error.as_ref().map(|e| e.kind),
            can_recover: last_error.as_ref().is_some_and(|e| e.recoverable),
            recovery_actions: last_error.map(|e| e.actions).unwrap_or_default(),
            is_recovering: self.recovery.is_recovering(),
        }
    }

    pub fn get_performance_metrics(&self) -> PerformanceSnapshot {
        self.monitor.snapshot()
    }

    pub fn get_cache_stats(&self) -> Vec<CacheStats> {
        vec![self.engine.cache_stats(), self.last_good.stats()]
    }

    pub fn get_pool_metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    pub fn get_breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// Drop both result caches
    pub async fn clear_caches(&self) {
        self.engine.clear_cache().await;
        self.last_good.clear().await;
    }

    /// Start pool maintenance and the periodic cache sweep
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let engine = Arc::downgrade(&self.engine);
        let last_good = self.last_good.clone();
        let period = self.search.cache_sweep_interval;

        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    debug!("Search engine dropped, stopping cache sweep");
                    break;
                };
                engine.sweep_cache().await;
                last_good.sweep().await;
            }
        });

        vec![self.pool.spawn_maintenance(), sweep]
    }

    pub fn shutdown(&self) {
        info!("Shutting down search orchestrator");
        self.pool.shutdown();
    }
}
