//! Recovery, circuit breaking and diagnostics of the search orchestrator

mod common;

use common::{
    breaker_config, connection_error, fast_orchestrator, index_error, orchestrator, profile,
    timeout_error, unknown_error, Behavior, Fixture, ScriptedEngine,
};
use kiosk_search::circuit_breaker::CircuitBreakerState;
use kiosk_search::models::{RecordKind, ResultSource, SearchFilters, SearchOptions};
use kiosk_search::monitor::MonitorConfig;
use kiosk_search::orchestrator::{
    EnhancedSearchManager, HealthIssueKind, SearchComponents, Severity,
};
use kiosk_search::search::{RankedSearch, SearchErrorKind};
use kiosk_search::AppError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator over `script`, plus a handle on the scripted engine
fn scripted(fixture: &Fixture, script: Vec<Behavior>) -> (EnhancedSearchManager, Arc<ScriptedEngine>) {
    let components = fixture.components();
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&components.engine), script));
    let manager = orchestrator(components.with_engine(engine.clone() as Arc<dyn RankedSearch>));
    (manager, engine)
}

fn always_failing(
    fixture: &Fixture,
    error: fn() -> AppError,
) -> (EnhancedSearchManager, Arc<ScriptedEngine>) {
    let components = fixture.components();
    let engine = Arc::new(ScriptedEngine::failing(Arc::clone(&components.engine), error));
    let manager = orchestrator(components.with_engine(engine.clone() as Arc<dyn RankedSearch>));
    (manager, engine)
}

fn search_error(result: kiosk_search::Result<kiosk_search::models::SearchResponse>) -> kiosk_search::search::SearchError {
    match result {
        Err(AppError::Search(error)) => error,
        Err(other) => panic!("expected a classified search error, got {}", other),
        Ok(response) => panic!("expected an error, got {} hits", response.total_hits),
    }
}

async fn wait_for_rebuild(manager: &EnhancedSearchManager) {
    for _ in 0..50 {
        if !manager.rebuild_pending() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("background rebuild did not finish");
}

#[tokio::test]
async fn test_healthy_search_passes_through() {
    let fixture = Fixture::seeded().await;
    let manager = orchestrator(fixture.components());

    let response = manager
        .search_all("graduation", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();

    assert_eq!(response.source, ResultSource::Ranked);
    assert_eq!(response.total_hits, 4);
    assert!(!manager.get_recovery_status().has_error);

    let metrics = manager.get_performance_metrics();
    assert_eq!(metrics.operations["search_all"].count, 1);
    assert_eq!(metrics.operations["search_all"].error_count, 0);
}

#[tokio::test]
async fn test_index_error_falls_back_and_schedules_rebuild() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = always_failing(&fixture, index_error);

    let response = manager
        .search_all("graduation", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();

    assert_eq!(response.source, ResultSource::Fallback);
    assert_eq!(response.total_hits, 4);
    assert_eq!(engine.calls(), 1);
    assert!(manager.rebuild_pending());

    let status = manager.get_recovery_status();
    assert!(status.has_error);
    assert_eq!(status.error_kind, Some(SearchErrorKind::IndexError));
    assert!(status.can_recover);
    assert!(!status.is_recovering);

    wait_for_rebuild(&manager).await;
    assert!(manager
        .verify_integrity()
        .await
        .unwrap()
        .iter()
        .all(|s| s.healthy));
}

#[tokio::test]
async fn test_index_error_without_fallback_rebuilds_and_retries() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = scripted(&fixture, vec![Behavior::Fail(index_error), Behavior::Pass]);

    let response = manager
        .search_all(
            "graduation",
            &SearchFilters::new(),
            &SearchOptions::new().without_fallback(),
        )
        .await
        .unwrap();

    assert_eq!(response.source, ResultSource::Ranked);
    assert_eq!(engine.calls(), 2);
    assert!(!manager.get_recovery_status().has_error);
}

#[tokio::test]
async fn test_connection_error_reconnects() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) =
        scripted(&fixture, vec![Behavior::Fail(connection_error), Behavior::Pass]);
    let generation = manager.get_pool_metrics().generation;

    let response = manager
        .search_all("parade", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();

    assert_eq!(response.source, ResultSource::Ranked);
    assert_eq!(response.total_hits, 2);
    assert_eq!(engine.reinit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_pool_metrics().generation, generation + 1);
}

#[tokio::test]
async fn test_timeout_retries_with_reduced_query() {
    let fixture = Fixture::seeded().await;
    let (manager, _engine) =
        scripted(&fixture, vec![Behavior::Fail(timeout_error), Behavior::Pass]);

    let response = manager
        .search_all(
            "graduation parade",
            &SearchFilters::new(),
            &SearchOptions::new().with_limit(50),
        )
        .await
        .unwrap();

    assert_eq!(response.query, "graduation");
    assert_eq!(response.limit, manager.config().reduced_limit);

    let status = manager.get_recovery_status();
    assert_eq!(status.error_kind, Some(SearchErrorKind::Timeout));
    assert!(manager.get_health_status().healthy);
}

#[tokio::test]
async fn test_unknown_error_falls_back() {
    let fixture = Fixture::seeded().await;
    let (manager, _engine) = always_failing(&fixture, unknown_error);

    let response = manager
        .search_all("chess", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();

    assert_eq!(response.source, ResultSource::Fallback);
    assert_eq!(response.results[0].title, "Alan Turing");
    assert!(!manager.rebuild_pending());
}

#[tokio::test]
async fn test_exhausted_recovery_reports_attempts() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = always_failing(&fixture, unknown_error);

    let error = search_error(
        manager
            .search_all(
                "chess",
                &SearchFilters::new(),
                &SearchOptions::new().without_fallback(),
            )
            .await,
    );

    assert_eq!(error.kind, SearchErrorKind::Unknown);
    assert_eq!(error.attempts, 2);
    assert_eq!(error.query.as_deref(), Some("chess"));
    assert_eq!(engine.calls(), 2);
    assert!(manager.get_recovery_status().has_error);
}

#[tokio::test]
async fn test_index_error_exhaustion_retries_after_each_rebuild() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = always_failing(&fixture, index_error);

    let error = search_error(
        manager
            .search_all(
                "chess",
                &SearchFilters::new(),
                &SearchOptions::new().without_fallback(),
            )
            .await,
    );

    assert_eq!(error.kind, SearchErrorKind::IndexError);
    // primary, rebuild retry, cycle retry, rebuild retry
    assert_eq!(engine.calls(), 4);
}

#[tokio::test]
async fn test_invalid_query_is_not_retried() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = scripted(&fixture, vec![Behavior::Pass]);

    let error = search_error(
        manager
            .search_all("\"unterminated", &SearchFilters::new(), &SearchOptions::new())
            .await,
    );

    assert_eq!(error.kind, SearchErrorKind::Validation);
    assert!(!error.recoverable);
    assert_eq!(engine.calls(), 0);

    let health = manager.get_health_status();
    assert_eq!(health.summary.samples, 0);
    assert!(health.healthy);
}

#[tokio::test]
async fn test_engine_validation_error_does_not_trip_breaker() {
    let fixture = Fixture::seeded().await;
    let (manager, engine) = scripted(
        &fixture,
        vec![Behavior::Fail(|| AppError::Validation("too complex".to_string()))],
    );

    let error = search_error(
        manager
            .search_all("graduation", &SearchFilters::new(), &SearchOptions::new())
            .await,
    );

    assert_eq!(error.kind, SearchErrorKind::Validation);
    assert_eq!(engine.calls(), 1);
    assert_eq!(manager.get_breaker_stats().consecutive_failures, 0);
    assert_eq!(manager.get_health_status().summary.samples, 0);
    assert!(!manager
        .get_performance_metrics()
        .operations
        .contains_key("search_all"));
    assert!(manager.get_recovery_status().has_error);
}

#[tokio::test]
async fn test_open_breaker_serves_last_good_then_fallback() {
    let fixture = Fixture::seeded().await;
    let components = fixture.components();
    let engine = Arc::new(ScriptedEngine::new(
        Arc::clone(&components.engine),
        vec![Behavior::Pass, Behavior::Fail(unknown_error)],
    ));
    let manager = EnhancedSearchManager::new(
        components.with_engine(engine.clone() as Arc<dyn RankedSearch>),
        fast_orchestrator(),
        breaker_config(2, Duration::from_secs(30)),
        MonitorConfig::default(),
    )
    .unwrap();
    let filters = SearchFilters::new();
    let options = SearchOptions::new();

    let good = manager.search_all("parade", &filters, &options).await.unwrap();
    assert_eq!(good.source, ResultSource::Ranked);

    manager.search_all("chess", &filters, &options).await.unwrap();
    manager.search_all("debate", &filters, &options).await.unwrap();
    let calls = engine.calls();

    let cached = manager.search_all("parade", &filters, &options).await.unwrap();
    assert_eq!(cached.source, ResultSource::ShortCircuit);
    assert!(cached.cache_hit);
    assert_eq!(cached.total_hits, good.total_hits);

    let scanned = manager.search_all("turing", &filters, &options).await.unwrap();
    assert_eq!(scanned.source, ResultSource::ShortCircuit);
    assert_eq!(scanned.results[0].title, "Alan Turing");

    assert!(manager
        .search_all("turing", &filters, &SearchOptions::new().without_fallback())
        .await
        .is_err());
    assert_eq!(engine.calls(), calls);

    let health = manager.get_health_status();
    assert!(!health.healthy);
    assert!(health
        .issues
        .iter()
        .any(|i| i.kind == HealthIssueKind::CircuitOpen && i.severity == Severity::Critical));

    assert_eq!(
        manager.get_search_suggestions("gra", 5).await,
        vec!["graduation".to_string()]
    );
}

#[tokio::test]
async fn test_cancelled_trial_search_releases_half_open_slot() {
    let fixture = Fixture::seeded().await;
    let components = fixture.components();
    let engine = Arc::new(ScriptedEngine::new(
        Arc::clone(&components.engine),
        vec![
            Behavior::Fail(unknown_error),
            Behavior::Stall(Duration::from_secs(2)),
            Behavior::Pass,
        ],
    ));
    let manager = EnhancedSearchManager::new(
        components.with_engine(engine.clone() as Arc<dyn RankedSearch>),
        fast_orchestrator(),
        breaker_config(1, Duration::from_millis(50)),
        MonitorConfig::default(),
    )
    .unwrap();
    let filters = SearchFilters::new();
    let options = SearchOptions::new();

    let first = manager.search_all("chess", &filters, &options).await.unwrap();
    assert_eq!(first.source, ResultSource::Fallback);
    assert_eq!(manager.get_breaker_stats().state, CircuitBreakerState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let before_trial = engine.calls();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        manager.search_all("parade", &filters, &options),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(engine.calls(), before_trial + 1);

    let next = manager.search_all("parade", &filters, &options).await.unwrap();
    assert_eq!(engine.calls(), before_trial + 2);
    assert_eq!(next.source, ResultSource::Ranked);
    assert_eq!(manager.get_breaker_stats().state, CircuitBreakerState::Closed);
}

#[tokio::test]
async fn test_suggestions_degrade_to_static_terms() {
    let fixture = Fixture::seeded().await;

    let manager = orchestrator(fixture.components());
    let suggestions = manager.get_search_suggestions("gra", 10).await;
    assert!(suggestions.contains(&"Grace Hopper".to_string()));

    let (manager, _engine) = always_failing(&fixture, index_error);
    assert_eq!(
        manager.get_search_suggestions("home", 10).await,
        vec!["homecoming".to_string()]
    );
}

#[tokio::test]
async fn test_error_rate_makes_service_unhealthy() {
    let fixture = Fixture::seeded().await;
    let (manager, _engine) = always_failing(&fixture, unknown_error);
    let options = SearchOptions::new().without_fallback();

    for _ in 0..10 {
        let _ = manager
            .search_all("chess", &SearchFilters::new(), &options)
            .await;
    }

    let health = manager.get_health_status();
    assert_eq!(health.summary.samples, 10);
    assert_eq!(health.summary.error_rate, 1.0);
    assert!(!health.healthy);
    assert!(health
        .issues
        .iter()
        .any(|i| i.kind == HealthIssueKind::HighErrorRate));
}

#[tokio::test]
async fn test_degraded_kind_triggers_background_rebuild() {
    let fixture = Fixture::seeded().await;
    let manager = orchestrator(fixture.components());
    fixture.drop_index(RecordKind::Photo).await;
    let filters = SearchFilters::new();
    let options = SearchOptions::new();

    let degraded = manager.search_all("graduation", &filters, &options).await.unwrap();
    assert_eq!(degraded.degraded_kinds, vec![RecordKind::Photo]);
    assert!(manager.rebuild_pending());

    wait_for_rebuild(&manager).await;
    let healed = manager.search_all("graduation", &filters, &options).await.unwrap();
    assert!(healed.degraded_kinds.is_empty());
    assert_eq!(healed.total_hits, 4);
}

#[tokio::test]
async fn test_snapshot_restore_replaces_store() {
    let fixture = Fixture::seeded().await;
    let manager = orchestrator(fixture.components());
    let filters = SearchFilters::new();
    let options = SearchOptions::new();

    let snapshot = manager.export_snapshot().await.unwrap();
    fixture
        .store()
        .import(vec![profile("Zelda", "Fitzgerald", 1920, "Jazz age writer")])
        .await
        .unwrap();
    let found = manager.search_all("zelda", &filters, &options).await.unwrap();
    assert_eq!(found.total_hits, 1);

    manager.restore_snapshot(snapshot).await.unwrap();
    let gone = manager.search_all("zelda", &filters, &options).await.unwrap();
    assert_eq!(gone.total_hits, 0);
    assert!(!gone.cache_hit);

    assert!(manager.restore_snapshot(b"not a database".to_vec()).await.is_err());
}

#[tokio::test]
async fn test_maintenance_operations_and_diagnostics() {
    let fixture = Fixture::seeded().await;
    let manager = orchestrator(fixture.components());
    fixture.drop_index(RecordKind::Staff).await;

    let repaired = manager.repair_corrupted_indexes().await.unwrap();
    assert_eq!(repaired, vec!["rebuilt staff index".to_string()]);
    assert!(manager
        .optimize_indexes()
        .await
        .unwrap()
        .iter()
        .all(|o| o.success));
    manager.rebuild_indexes(Some(vec![RecordKind::Profile])).await.unwrap();

    let caches = manager.get_cache_stats();
    let names: Vec<_> = caches.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["search", "last_good"]);

    manager.search_all("parade", &SearchFilters::new(), &SearchOptions::new()).await.unwrap();
    manager.clear_caches().await;
    let again = manager
        .search_all("parade", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();
    assert!(!again.cache_hit);

    manager.shutdown();
    assert!(manager.get_pool_metrics().closed);
}
