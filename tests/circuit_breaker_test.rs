//! Circuit breaker state machine under sequential and concurrent load

use kiosk_search::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerState,
};
use kiosk_search::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn breaker(threshold: u32, success: u32, cooldown_ms: u64) -> CircuitBreaker {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(threshold)
        .success_threshold(success)
        .cooldown(Duration::from_millis(cooldown_ms))
        .build()
        .unwrap();
    CircuitBreaker::new("integration", config)
}

async fn fail(breaker: &CircuitBreaker) {
    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
}

#[test]
fn test_invalid_configs_rejected() {
    assert!(CircuitBreakerConfig::builder()
        .failure_threshold(0)
        .build()
        .is_err());
    assert!(CircuitBreakerConfig::builder()
        .cooldown(Duration::ZERO)
        .build()
        .is_err());

    let err = CircuitBreakerConfig::builder()
        .success_threshold(3)
        .half_open_max_requests(1)
        .build()
        .unwrap_err();
    let app: AppError = err.into();
    assert!(matches!(app, AppError::Configuration(_)));
}

#[tokio::test]
async fn test_operation_error_is_reported() {
    let breaker = breaker(3, 1, 1000);
    let result = breaker.call(|| async { Err::<(), _>("index missing") }).await;
    match result {
        Err(CircuitBreakerError::OperationFailed(msg)) => assert_eq!(msg, "index missing"),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert_eq!(breaker.stats().consecutive_failures, 1);
}

#[tokio::test]
async fn test_open_circuit_reports_retry_after() {
    let breaker = breaker(2, 1, 10_000);
    fail(&breaker).await;
    fail(&breaker).await;

    match breaker.try_acquire() {
        Err(CircuitBreakerError::Open { name, retry_after }) => {
            assert_eq!(name, "integration");
            assert!(retry_after > Duration::ZERO);
            assert!(retry_after <= Duration::from_secs(10));
        }
        other => panic!("expected open circuit, got {:?}", other),
    }

    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitBreakerState::Open);
    assert!(stats.retry_after_ms > 0);
}

#[tokio::test]
async fn test_half_open_needs_success_threshold() {
    let breaker = breaker(1, 2, 40);
    fail(&breaker).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);

    breaker.call(|| async { Ok::<_, String>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);
    breaker.call(|| async { Ok::<_, String>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitBreakerState::Closed);
}

#[tokio::test]
async fn test_full_cycle_counts_transitions() {
    let breaker = breaker(1, 1, 30);

    fail(&breaker).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    fail(&breaker).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    breaker.call(|| async { Ok::<_, String>(()) }).await.unwrap();

    // closed→open→half-open→open→half-open→closed
    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitBreakerState::Closed);
    assert_eq!(stats.transition_count, 5);
}

#[tokio::test]
async fn test_concurrent_failures_open_once_and_block_calls() {
    let breaker = Arc::new(breaker(5, 1, 10_000));
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move { fail(&breaker).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(breaker.state(), CircuitBreakerState::Open);
    assert_eq!(breaker.stats().transition_count, 1);

    let invoked = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let invoked = Arc::clone(&invoked);
        let result = breaker
            .call(|| async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clones_share_state() {
    let breaker = breaker(2, 1, 10_000);
    let clone = breaker.clone();
    fail(&breaker).await;
    fail(&clone).await;
    assert_eq!(breaker.state(), CircuitBreakerState::Open);

    clone.reset();
    assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    assert_eq!(breaker.stats().consecutive_failures, 0);
}
