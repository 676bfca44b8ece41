//! Connection pool behavior under contention

mod common;

use common::Fixture;
use kiosk_search::db::{PoolConfig, PoolError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn sized(min: usize, max: usize) -> PoolConfig {
    PoolConfig {
        min_connections: min,
        max_connections: max,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_waiters_are_served_in_fifo_order() {
    let fixture = Fixture::with_pool_config(sized(1, 1)).await;
    let pool = fixture.pool.clone();
    let held = pool.acquire().await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..3 {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            order.lock().push(i);
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(conn);
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(pool.metrics().waiting_requests, 3);
    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_active_connections_never_exceed_max() {
    let fixture = Fixture::with_pool_config(sized(1, 3)).await;
    let pool = fixture.pool.clone();
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let pool = pool.clone();
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                peak.fetch_max(pool.metrics().active_connections, Ordering::SeqCst);
                conn.interact(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let metrics = pool.metrics();
    assert_eq!(metrics.active_connections, 0);
    assert!(metrics.total_connections <= 3);
    assert_eq!(metrics.acquired, metrics.released);
}

#[tokio::test]
async fn test_shutdown_rejects_waiters_and_later_acquires() {
    let fixture = Fixture::with_pool_config(sized(1, 1)).await;
    let pool = fixture.pool.clone();
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.shutdown();
    assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    assert!(pool.is_closed());

    drop(held);
    assert_eq!(pool.metrics().total_connections, 0);
}

#[tokio::test]
async fn test_sweep_keeps_minimum() {
    let config = PoolConfig {
        min_connections: 1,
        max_connections: 3,
        idle_timeout: Duration::from_millis(1),
        ..Default::default()
    };
    let fixture = Fixture::with_pool_config(config).await;
    let pool = fixture.pool.clone();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    drop((a, b, c));
    assert_eq!(pool.metrics().idle_connections, 3);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pool.sweep(), 2);
    assert_eq!(pool.metrics().total_connections, 1);
}

#[tokio::test]
async fn test_timed_out_waiter_leaves_queue() {
    let config = PoolConfig {
        min_connections: 1,
        max_connections: 1,
        acquire_timeout: Duration::from_millis(30),
        ..Default::default()
    };
    let fixture = Fixture::with_pool_config(config).await;
    let pool = fixture.pool.clone();
    let held = pool.acquire().await.unwrap();

    let result = pool.acquire().await;
    assert!(matches!(result, Err(PoolError::AcquireTimeout(_))));
    assert_eq!(pool.metrics().waiting_requests, 0);
    assert_eq!(pool.metrics().timeouts, 1);

    drop(held);
    assert!(pool.acquire().await.is_ok());
}
