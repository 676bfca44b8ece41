//! Index rebuild, verification, repair and compaction

mod common;

use common::Fixture;
use kiosk_search::db::schema;
use kiosk_search::models::{Publication, Record, RecordKind, SearchFilters, SearchOptions};
use kiosk_search::search::{IndexManager, SearchManager, SearchConfig};
use kiosk_search::query::QueryBuilder;

fn stats_for(stats: &[kiosk_search::search::IndexStats], kind: RecordKind) -> &kiosk_search::search::IndexStats {
    stats.iter().find(|s| s.kind == kind).unwrap()
}

fn newsletter(title: &str) -> Record {
    Record::Publication(Publication {
        title: title.to_string(),
        publication_type: "newsletter".to_string(),
        ..Default::default()
    })
}

async fn drop_triggers(fixture: &Fixture, kind: RecordKind) {
    let mut conn = fixture.pool.acquire().await.unwrap();
    conn.interact(move |conn| schema::drop_triggers(conn, kind))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_seeded_store_verifies_healthy() {
    let fixture = Fixture::seeded().await;
    let stats = IndexManager::new(fixture.pool.clone())
        .verify_integrity()
        .await
        .unwrap();

    assert_eq!(stats.len(), 4);
    for stat in &stats {
        assert!(stat.healthy, "{} unhealthy: {:?}", stat.kind, stat.issue);
        assert_eq!(stat.base_count, stat.index_count);
    }
    assert_eq!(stats_for(&stats, RecordKind::Profile).base_count, 4);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let fixture = Fixture::seeded().await;
    let manager = IndexManager::new(fixture.pool.clone());

    manager.rebuild_indexes(None).await.unwrap();
    let first = manager.verify_integrity().await.unwrap();
    manager.rebuild_indexes(None).await.unwrap();
    let second = manager.verify_integrity().await.unwrap();

    for kind in RecordKind::all() {
        let a = stats_for(&first, kind);
        let b = stats_for(&second, kind);
        assert!(a.healthy && b.healthy);
        assert_eq!(a.index_count, b.index_count);
        assert!(b.last_rebuild.is_some());
        assert!(b.last_rebuild >= a.last_rebuild);
    }
}

#[tokio::test]
async fn test_rebuild_selected_kind_restores_search() {
    let fixture = Fixture::seeded().await;
    fixture.drop_index(RecordKind::Photo).await;
    let manager = IndexManager::new(fixture.pool.clone());

    manager
        .rebuild_indexes(Some(vec![RecordKind::Photo]))
        .await
        .unwrap();

    let engine = SearchManager::new(
        fixture.pool.clone(),
        QueryBuilder::default(),
        SearchConfig::default(),
    )
    .unwrap();
    let response = engine
        .search_all("graduation", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();
    assert!(response.degraded_kinds.is_empty());
    assert!(response.results.iter().any(|r| r.kind == RecordKind::Photo));
}

#[tokio::test]
async fn test_verify_detects_count_drift() {
    let fixture = Fixture::seeded().await;
    drop_triggers(&fixture, RecordKind::Publication).await;
    fixture
        .store()
        .import(vec![newsletter("Fall"), newsletter("Winter"), newsletter("Summer")])
        .await
        .unwrap();

    let stats = IndexManager::new(fixture.pool.clone())
        .verify_integrity()
        .await
        .unwrap();
    let publications = stats_for(&stats, RecordKind::Publication);
    assert!(!publications.healthy);
    assert_eq!(publications.base_count, 5);
    assert_eq!(publications.index_count, 2);
    assert!(publications.issue.is_some());
    assert!(stats_for(&stats, RecordKind::Staff).healthy);
}

#[tokio::test]
async fn test_repair_rebuilds_only_unhealthy_kinds() {
    let fixture = Fixture::seeded().await;
    let manager = IndexManager::new(fixture.pool.clone());

    assert!(manager.repair_corrupted_indexes().await.unwrap().is_empty());

    fixture.drop_index(RecordKind::Staff).await;
    drop_triggers(&fixture, RecordKind::Publication).await;
    fixture
        .store()
        .import(vec![newsletter("Fall"), newsletter("Winter"), newsletter("Summer")])
        .await
        .unwrap();

    let repaired = manager.repair_corrupted_indexes().await.unwrap();
    assert_eq!(repaired.len(), 2);
    assert!(repaired.contains(&"rebuilt staff index".to_string()));
    assert!(repaired.contains(&"rebuilt publication index".to_string()));

    let stats = manager.verify_integrity().await.unwrap();
    assert!(stats.iter().all(|s| s.healthy));

    // Triggers are back, so new rows reach the index
    fixture.store().import(vec![newsletter("Autumn")]).await.unwrap();
    let stats = manager.verify_integrity().await.unwrap();
    let publications = stats_for(&stats, RecordKind::Publication);
    assert_eq!(publications.base_count, 6);
    assert_eq!(publications.index_count, 6);
}

#[tokio::test]
async fn test_optimize_continues_past_failures() {
    let fixture = Fixture::seeded().await;
    fixture.drop_index(RecordKind::Profile).await;

    let outcomes = IndexManager::new(fixture.pool.clone())
        .optimize_indexes()
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 4);
    for outcome in &outcomes {
        if outcome.kind == RecordKind::Profile {
            assert!(!outcome.success);
            assert!(outcome.error.is_some());
        } else {
            assert!(outcome.success, "{} failed: {:?}", outcome.kind, outcome.error);
        }
    }
}

#[tokio::test]
async fn test_corrupt_index_is_reported_and_repaired() {
    let fixture = Fixture::seeded().await;
    fixture
        .execute("DELETE FROM photos_fts_data WHERE id > 10")
        .await;
    let manager = IndexManager::new(fixture.pool.clone());

    let stats = manager.verify_integrity().await.unwrap();
    let photos = stats_for(&stats, RecordKind::Photo);
    assert!(!photos.healthy);
    assert_eq!(photos.base_count, photos.index_count);
    assert!(photos.issue.as_deref().unwrap().starts_with("index corrupt"));

    let engine = SearchManager::new(
        fixture.pool.clone(),
        QueryBuilder::default(),
        SearchConfig::default(),
    )
    .unwrap();
    let degraded = engine
        .search_all("graduation", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();
    assert_eq!(degraded.degraded_kinds, vec![RecordKind::Photo]);

    let repaired = manager.repair_corrupted_indexes().await.unwrap();
    assert_eq!(repaired, vec!["rebuilt photo index".to_string()]);
    assert!(manager
        .verify_integrity()
        .await
        .unwrap()
        .iter()
        .all(|s| s.healthy));

    let response = engine
        .search_all("parade", &SearchFilters::new(), &SearchOptions::new())
        .await
        .unwrap();
    assert!(response.degraded_kinds.is_empty());
    assert!(response
        .results
        .iter()
        .any(|r| r.title == "Homecoming Parade"));
}
