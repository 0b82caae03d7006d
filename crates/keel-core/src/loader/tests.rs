//! Tests for the progressive loader

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::cache::{CacheConfig, SmartCache};
use crate::error::KeelError;
use crate::recovery::backoff::ConstantBackoff;

type Log = Arc<Mutex<Vec<String>>>;

fn loader_with(max_concurrent_queries: usize) -> ProgressiveLoader {
    ProgressiveLoader::new(LoaderConfig::default().with_max_concurrent_queries(max_concurrent_queries))
}

/// Loader that logs its start and end around a 10ms fetch
fn tracked(log: &Log, key: &str, priority: u32) -> LoaderDescriptor {
    let log = Arc::clone(log);
    let name = key.to_string();
    LoaderDescriptor::new(key, priority, move || {
        let log = Arc::clone(&log);
        let name = name.clone();
        async move {
            log.lock().push(format!("start {}", name));
            tokio::time::sleep(Duration::from_millis(10)).await;
            log.lock().push(format!("end {}", name));
            Ok(name)
        }
    })
}

/// Loader that counts calls and always fails
fn failing(key: &str, priority: u32, calls: &Arc<AtomicU32>) -> LoaderDescriptor {
    let calls = Arc::clone(calls);
    LoaderDescriptor::new(key, priority, move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<u32, _>(KeelError::operation("503 service unavailable")) }
    })
}

/// Loader that tracks the peak number of fetches in flight
fn gauged(key: &str, in_flight: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> LoaderDescriptor {
    let in_flight = Arc::clone(in_flight);
    let peak = Arc::clone(peak);
    LoaderDescriptor::new(key, 1, move || {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_order_with_dependency() {
    let log: Log = Arc::default();
    let loader = loader_with(1);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();
    loader
        .add_loader(tracked(&log, "B", 1).depends_on("A"))
        .unwrap();
    loader.add_loader(tracked(&log, "C", 1)).unwrap();

    let results = loader.load_all().await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["start A", "end A", "start B", "end B", "start C", "end C"]
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results["B"], json!("B"));

    let state = loader.state();
    assert_eq!(state.phase, LoadingPhase::Completed);
    assert!(!state.is_loading);
    assert!(!state.has_error);
    assert_eq!(state.progress, 100);
    assert_eq!(state.completed_loaders.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_per_chunk() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let loader = loader_with(2);
    for key in ["a", "b", "c", "d", "e"] {
        loader.add_loader(gauged(key, &in_flight, &peak)).unwrap();
    }

    let start = Instant::now();
    loader.load_all().await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    // 100ms batch delay, then three chunks of 10ms
    assert_eq!(start.elapsed(), Duration::from_millis(130));
}

#[tokio::test(start_paused = true)]
async fn test_critical_loaders_run_one_at_a_time() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let loader = loader_with(3);
    for key in ["x", "y", "z"] {
        let descriptor = gauged(key, &in_flight, &peak);
        let critical = LoaderDescriptor {
            priority: 0,
            ..descriptor
        };
        loader.add_loader(critical).unwrap();
    }

    let start = Instant::now();
    loader.load_all().await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    // No batch delay before the critical tier
    assert_eq!(start.elapsed(), Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_dependency_on_failed_loader_is_skipped() {
    let log: Log = Arc::default();
    let calls = Arc::new(AtomicU32::new(0));
    let loader = loader_with(3);
    loader.add_loader(failing("A", 0, &calls)).unwrap();
    loader
        .add_loader(tracked(&log, "B", 1).depends_on("A"))
        .unwrap();
    loader.add_loader(tracked(&log, "C", 1)).unwrap();

    loader.load_all().await.unwrap();

    let state = loader.state();
    assert_eq!(state.phase, LoadingPhase::Completed);
    assert!(state.failed_loaders.contains("A"));
    assert!(state.completed_loaders.contains("C"));
    assert!(!state.completed_loaders.contains("B"));
    assert!(!state.failed_loaders.contains("B"));
    assert_eq!(state.progress, 67);
    assert!(!state.has_error);
    assert!(!log.lock().iter().any(|entry| entry.ends_with('B')));
}

#[tokio::test(start_paused = true)]
async fn test_batch_without_ready_loaders_is_skipped() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader
        .add_loader(tracked(&log, "early", 1).depends_on("late"))
        .unwrap();
    loader.add_loader(tracked(&log, "late", 2)).unwrap();

    loader.load_all().await.unwrap();

    let state = loader.state();
    assert_eq!(state.completed_loaders.len(), 1);
    assert!(state.completed_loaders.contains("late"));
    assert_eq!(state.progress, 50);
}

#[tokio::test]
async fn test_unknown_dependency_fails_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let loader = loader_with(3);
    loader.add_loader(failing("A", 0, &calls)).unwrap();
    loader
        .add_loader(failing("B", 1, &calls).depends_on("typo"))
        .unwrap();

    let err = loader.load_all().await.unwrap_err();
    assert!(matches!(err, KeelError::InvalidInput { .. }));
    assert!(err.to_string().contains("typo"));

    let state = loader.state();
    assert_eq!(state.phase, LoadingPhase::Errored);
    assert!(state.has_error);
    assert!(!state.is_loading);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_add_loader_rejects_duplicates_and_self_dependency() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();

    let duplicate = loader.add_loader(tracked(&log, "A", 1)).unwrap_err();
    assert!(matches!(duplicate, KeelError::InvalidInput { .. }));

    let cyclic = loader
        .add_loader(tracked(&log, "B", 1).depends_on("B"))
        .unwrap_err();
    assert!(matches!(cyclic, KeelError::InvalidInput { .. }));

    assert_eq!(loader.loader_keys(), vec!["A".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_fetch_and_miss_writes_through() {
    let cache = Arc::new(SmartCache::new(CacheConfig::default()));
    cache.set("patients:", &json!(["ada"]), None).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counted = {
        let calls = Arc::clone(&calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(vec!["fresh".to_string()]) }
        }
    };

    let loader = ProgressiveLoader::builder(LoaderConfig::default())
        .cache(Arc::clone(&cache))
        .build();
    loader
        .add_loader(LoaderDescriptor::new("patients", 0, counted.clone()).with_cache("patients:", None))
        .unwrap();
    loader
        .add_loader(
            LoaderDescriptor::new("visits", 1, counted)
                .with_cache("visits:", Some(Duration::from_secs(60))),
        )
        .unwrap();

    let results = loader.load_all().await.unwrap();

    assert_eq!(results["patients"], json!(["ada"]));
    assert_eq!(results["visits"], json!(["fresh"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get_value("visits:"), Some(json!(["fresh"])));
}

#[tokio::test(start_paused = true)]
async fn test_retry_on_error_moves_to_completed() {
    let calls = Arc::new(AtomicU32::new(0));
    let descriptor = {
        let calls = Arc::clone(&calls);
        LoaderDescriptor::new("flaky", 0, move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(KeelError::operation("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .retry_on_error()
    };

    let loader = loader_with(3);
    loader.add_loader(descriptor).unwrap();
    loader.load_all().await.unwrap();

    let state = loader.state();
    assert!(state.failed_loaders.contains("flaky"));
    assert_eq!(state.phase, LoadingPhase::Completed);

    let start = Instant::now();
    loader.settle_retries().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    let state = loader.state();
    assert!(state.completed_loaders.contains("flaky"));
    assert!(!state.failed_loaders.contains("flaky"));
    assert_eq!(loader.get_result_as::<u32>("flaky").unwrap(), Some(42));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_retry_stays_failed() {
    let calls = Arc::new(AtomicU32::new(0));
    let loader = loader_with(3);
    loader
        .add_loader(failing("down", 0, &calls).retry_on_error())
        .unwrap();

    loader.load_all().await.unwrap();
    loader.settle_retries().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(loader.state().failed_loaders.contains("down"));
}

#[tokio::test(start_paused = true)]
async fn test_abort_stops_later_batches() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();
    loader.add_loader(tracked(&log, "B", 1)).unwrap();

    let running = loader.clone();
    let session = tokio::spawn(async move { running.load_all().await });

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(loader.is_loading());
    loader.abort();

    let results = session.await.unwrap().unwrap();

    // The in-flight fetch finishes; nothing new is dispatched
    assert!(results.contains_key("A"));
    assert!(!results.contains_key("B"));
    assert_eq!(*log.lock(), vec!["start A", "end A"]);

    let state = loader.state();
    assert_eq!(state.phase, LoadingPhase::Aborted);
    assert!(!state.is_loading);
}

#[tokio::test(start_paused = true)]
async fn test_abort_drops_scheduled_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let loader = loader_with(3);
    loader
        .add_loader(failing("down", 0, &calls).retry_on_error())
        .unwrap();

    loader.load_all().await.unwrap();
    loader.abort();
    loader.settle_retries().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Abort after the session ended leaves its phase alone
    assert_eq!(loader.state().phase, LoadingPhase::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_load_all_while_loading_is_noop() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();

    let running = loader.clone();
    let session = tokio::spawn(async move { running.load_all().await });
    tokio::time::sleep(Duration::from_millis(5)).await;

    let early = loader.load_all().await.unwrap();
    assert!(early.is_empty());
    assert!(loader.is_loading());

    session.await.unwrap().unwrap();
    assert_eq!(*log.lock(), vec!["start A", "end A"]);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_progress() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();
    loader.add_loader(tracked(&log, "B", 1)).unwrap();

    let seen: Arc<Mutex<Vec<(LoadingPhase, u8, usize)>>> = Arc::default();
    let subscription = {
        let seen = Arc::clone(&seen);
        loader.subscribe(move |state, results| {
            seen.lock().push((state.phase, state.progress, results.len()));
        })
    };
    assert_eq!(loader.listener_count(), 1);

    loader.load_all().await.unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.first(), Some(&(LoadingPhase::Loading, 0, 0)));
    assert!(seen.contains(&(LoadingPhase::Loading, 50, 1)));
    assert_eq!(seen.last(), Some(&(LoadingPhase::Completed, 100, 2)));

    subscription.unsubscribe();
    assert_eq!(loader.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_subscription_stops_notifications() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    {
        let hits = Arc::clone(&hits);
        let _subscription = loader.subscribe(move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    loader.load_all().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watch_channel_has_latest_snapshot() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();
    let mut rx = loader.watch();

    loader.load_all().await.unwrap();

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.state.phase, LoadingPhase::Completed);
    assert_eq!(snapshot.results.get("A"), Some(&json!("A")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watch_ends_on_final_state_when_retry_notifies_concurrently() {
    let calls = Arc::new(AtomicU32::new(0));
    let retried = {
        let calls = Arc::clone(&calls);
        LoaderDescriptor::new("retried", 1, move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(KeelError::operation("connection reset"))
                } else {
                    Ok(1)
                }
            }
        })
        .retry_on_error()
    };
    let slow = LoaderDescriptor::new("slow", 2, || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(2)
    });

    let loader = ProgressiveLoader::builder(LoaderConfig::default())
        .retry_backoff(ConstantBackoff::new(Duration::ZERO))
        .build();
    loader.add_loader(retried).unwrap();
    loader.add_loader(slow).unwrap();

    // Stall the retry task's notification until the session has finished
    let stalled = Arc::new(AtomicBool::new(false));
    let _subscription = loader.subscribe({
        let stalled = Arc::clone(&stalled);
        move |state, _| {
            if state.phase == LoadingPhase::Loading
                && state.completed_loaders.contains("retried")
                && !stalled.swap(true, Ordering::SeqCst)
            {
                std::thread::sleep(Duration::from_millis(300));
            }
        }
    });

    loader.load_all().await.unwrap();
    loader.settle_retries().await;

    assert!(stalled.load(Ordering::SeqCst));
    assert_eq!(loader.state().phase, LoadingPhase::Completed);
    let snapshot = loader.watch().borrow().clone();
    assert_eq!(snapshot.state.phase, LoadingPhase::Completed);
    assert_eq!(snapshot.state.completed_loaders.len(), 2);
}

#[tokio::test]
async fn test_empty_session_completes() {
    let loader = loader_with(3);
    let results = loader.load_all().await.unwrap();

    assert!(results.is_empty());
    let state = loader.state();
    assert_eq!(state.phase, LoadingPhase::Completed);
    assert_eq!(state.progress, 100);
}

#[tokio::test(start_paused = true)]
async fn test_clear_resets_loader() {
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(tracked(&log, "A", 0)).unwrap();
    loader.load_all().await.unwrap();

    loader.clear();

    assert!(loader.loader_keys().is_empty());
    assert!(loader.get_result("A").is_none());
    assert_eq!(loader.state(), LoadingState::default());
}

#[tokio::test(start_paused = true)]
async fn test_second_session_starts_fresh() {
    let calls = Arc::new(AtomicU32::new(0));
    let log: Log = Arc::default();
    let loader = loader_with(3);
    loader.add_loader(failing("A", 0, &calls)).unwrap();
    loader.add_loader(tracked(&log, "B", 1)).unwrap();

    loader.load_all().await.unwrap();
    loader.load_all().await.unwrap();

    let state = loader.state();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.failed_loaders.len(), 1);
    assert_eq!(state.completed_loaders.len(), 1);
}

#[test]
fn test_loader_config_defaults() {
    let config = LoaderConfig::default();
    assert_eq!(config.max_concurrent_queries, 3);
    assert_eq!(config.batch_delay, Duration::from_millis(100));
    assert_eq!(config.retry_delay, Duration::from_secs(1));
}
