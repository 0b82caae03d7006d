//! Tests for circuit breaker functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::error::{KeelError, KeelResult};

fn config(failure_threshold: u32, recovery_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout: Duration::from_millis(recovery_ms),
        success_threshold: 2,
        ..Default::default()
    }
}

async fn fail(cb: &CircuitBreaker) -> KeelResult<()> {
    cb.execute(|| async { Err(KeelError::operation("503 service unavailable")) })
        .await
}

async fn succeed(cb: &CircuitBreaker) -> KeelResult<u32> {
    cb.execute(|| async { Ok(7) }).await
}

#[tokio::test]
async fn test_circuit_starts_closed() {
    let cb = CircuitBreaker::new("test");
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(cb.is_call_permitted());
    assert_eq!(cb.config().failure_threshold, 3);
}

#[tokio::test]
async fn test_circuit_opens_after_failures() {
    let cb = CircuitBreaker::with_config("test", config(3, 1000));

    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 2);

    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(!cb.is_call_permitted());
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let cb = CircuitBreaker::with_config("test", config(3, 1000));

    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    succeed(&cb).await.unwrap();
    assert_eq!(cb.failure_count(), 0);

    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_rejects_without_invoking() {
    let cb = CircuitBreaker::with_config("test", config(1, 1000));
    fail(&cb).await.unwrap_err();

    let invoked = Arc::new(AtomicU32::new(0));
    for _ in 0..5 {
        let invoked = invoked.clone();
        let err = cb
            .execute(|| async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        tokio::time::advance(Duration::from_millis(100)).await;
    }

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(cb.stats().total_rejections, 5);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_recovery_scenario() {
    let cb = CircuitBreaker::with_config("patients", config(3, 1000));

    for _ in 0..3 {
        fail(&cb).await.unwrap_err();
    }
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_millis(500)).await;
    let invoked = Arc::new(AtomicU32::new(0));
    let probe = invoked.clone();
    let err = cb
        .execute(|| async move {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();
    match err {
        KeelError::CircuitOpen { name, retry_in } => {
            assert_eq!(name, "patients");
            assert_eq!(retry_in, Duration::from_millis(500));
        }
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(cb.is_call_permitted());
    assert_eq!(succeed(&cb).await.unwrap(), 7);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert_eq!(cb.success_count(), 1);

    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_single_strike() {
    // A high threshold must not protect a failing probe
    let cb = CircuitBreaker::with_config("test", config(10, 200));
    cb.force_open(Duration::from_millis(200));

    tokio::time::advance(Duration::from_millis(250)).await;
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Open);

    let stats = cb.stats();
    assert_eq!(stats.next_attempt_in, Some(Duration::from_millis(200)));
    assert!(stats.last_failure_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_force_open_window() {
    let cb = CircuitBreaker::new("maintenance");
    cb.force_open(Duration::from_secs(60));
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(succeed(&cb).await.unwrap_err().is_circuit_open());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(succeed(&cb).await.is_ok());
}

#[tokio::test]
async fn test_reset_zeroes_counters() {
    let cb = CircuitBreaker::with_config("test", config(1, 60_000));
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state(), CircuitState::Open);

    cb.reset();

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
    assert_eq!(cb.success_count(), 0);
    assert!(succeed(&cb).await.is_ok());
}

#[tokio::test]
async fn test_stats_failure_rate() {
    let cb = CircuitBreaker::with_config("test", config(10, 1000));
    succeed(&cb).await.unwrap();
    fail(&cb).await.unwrap_err();
    succeed(&cb).await.unwrap();
    fail(&cb).await.unwrap_err();

    let stats = cb.stats();
    assert_eq!(stats.total_calls, 4);
    assert_eq!(stats.total_failures, 2);
    assert!((stats.failure_rate() - 50.0).abs() < f64::EPSILON);
    assert_eq!(stats.next_attempt_in, None);
}

#[tokio::test]
async fn test_registry_shares_breakers() {
    let registry = CircuitBreakerRegistry::with_config(config(1, 60_000));

    let a = registry.get("billing");
    let b = registry.get("billing");
    assert!(Arc::ptr_eq(&a, &b));

    fail(&a).await.unwrap_err();
    assert_eq!(b.state(), CircuitState::Open);

    let custom = registry.get_with_config("inventory", config(5, 10));
    assert_eq!(custom.config().failure_threshold, 5);
    assert_eq!(registry.names(), vec!["billing", "inventory"]);

    let stats = registry.all_stats();
    assert_eq!(stats[0].state, CircuitState::Open);
    assert_eq!(stats[1].state, CircuitState::Closed);

    registry.reset_all();
    assert_eq!(a.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_registry_monitor_stops_on_cancel() {
    let registry = Arc::new(CircuitBreakerRegistry::with_config(CircuitBreakerConfig {
        monitoring_period: Duration::from_secs(1),
        ..Default::default()
    }));
    registry.get("api");

    let cancel = CancellationToken::new();
    let handle = registry.spawn_monitor(cancel.clone());

    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_registry_monitor_with_zero_period() {
    let registry = Arc::new(CircuitBreakerRegistry::with_config(CircuitBreakerConfig {
        monitoring_period: Duration::ZERO,
        ..Default::default()
    }));
    registry.get("api");

    let cancel = CancellationToken::new();
    let handle = registry.spawn_monitor(cancel.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    cancel.cancel();
    handle.await.unwrap();
}

#[test]
fn test_open_circuit_rejects_on_first_poll() {
    let cb = CircuitBreaker::with_config("poll", config(1, 60_000));
    let reached = Arc::new(AtomicU32::new(0));

    cb.force_open(Duration::from_secs(60));
    let mut call = tokio_test::task::spawn(cb.execute(|| {
        let reached = Arc::clone(&reached);
        async move {
            reached.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<KeelResult<()>>().await
        }
    }));

    let result = tokio_test::assert_ready!(call.poll());
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}
