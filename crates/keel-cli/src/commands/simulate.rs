//! `keel simulate`: progressive load against a flaky in-process service

use crate::args::SimulateArgs;
use crate::console::CliConsole;
use crate::service::FlakyService;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use keel_core::cache::{CacheStats, SmartCache};
use keel_core::config::KeelConfig;
use keel_core::loader::{LoaderSnapshot, LoadingState, ProgressiveLoader};
use keel_core::recovery::{
    CircuitBreakerRegistry, CircuitBreakerStats, ExecuteOptions, ExecutionHooks, OperationStats,
    TimeoutExecutor,
};
use keel_core::resilient::{DataSource, Query, ResilientFetcher};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "records-service";
const TABLES: [&str; 6] = ["accounts", "patients", "visits", "invoices", "labs", "notes"];

/// Final statistics of one simulated session
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub session: LoadingState,
    pub service_calls: u32,
    pub service_failures: u32,
    pub breakers: Vec<CircuitBreakerStats>,
    pub cache: CacheStats,
    pub operations: BTreeMap<String, OperationStats>,
}

/// Loader `i`: the first is critical, the next two form tier 1, the rest tier 2
/// and depend on loader 1
fn plan_query(index: usize) -> (String, u32, Option<String>, Query) {
    let table = TABLES[index % TABLES.len()];
    let key = format!("{}-{}", table, index);
    let (priority, dependency) = match index {
        0 => (0, None),
        1 | 2 => (1, None),
        _ => (2, Some(format!("{}-1", TABLES[1]))),
    };
    let query = Query::new(table).param("page", index / TABLES.len() + 1);
    (key, priority, dependency, query)
}

pub async fn run(config: &KeelConfig, args: &SimulateArgs, verbose: bool) -> Result<SimulationReport> {
    let console = CliConsole::new(verbose && !args.json);

    let registry = Arc::new(CircuitBreakerRegistry::with_config(
        config.circuit_breaker.clone(),
    ));
    let cache = Arc::new(SmartCache::new(config.cache.clone()));
    let executor = Arc::new(TimeoutExecutor::new(config.executor.clone()));
    let background = CancellationToken::new();
    let cleanup = cache.spawn_cleanup(background.child_token());
    let monitor = registry.spawn_monitor(background.child_token());

    let hooks = ExecutionHooks::new()
        .on_retry(|attempt, error, delay| {
            tracing::debug!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying fetch");
        })
        .on_timeout(|attempt| tracing::debug!(attempt, "Fetch attempt timed out"));
    let fetcher = Arc::new(
        ResilientFetcher::new(Arc::clone(&cache), registry.get(SERVICE_NAME), executor)
            .with_options(ExecuteOptions::new(config.executor.clone()).with_hooks(hooks)),
    );

    let service = Arc::new(FlakyService::new(
        SERVICE_NAME,
        Duration::from_millis(args.latency_ms),
        args.fail_every,
    ));
    let source: Arc<dyn DataSource> = service.clone();

    let loader = ProgressiveLoader::new(config.loader.clone());
    for index in 0..args.loaders {
        let (key, priority, dependency, query) = plan_query(index);
        let mut descriptor = fetcher
            .loader_descriptor(key, priority, Arc::clone(&source), query, None)
            .retry_on_error();
        if let Some(dependency) = dependency {
            descriptor = descriptor.depends_on(dependency);
        }
        loader
            .add_loader(descriptor)
            .context("Failed to register loader")?;
    }
    console.info(&format!("Registered {} loaders against {}", args.loaders, SERVICE_NAME));

    let progress = if args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .context("Invalid progress template")?,
    );
    let watcher = tokio::spawn(follow_progress(loader.watch(), progress.clone()));

    let session = loader.load_all().await;
    loader.settle_retries().await;

    background.cancel();
    join_background([("cache cleanup", cleanup), ("breaker monitor", monitor)]).await;
    watcher.await.context("Progress watcher panicked")?;
    progress.finish_and_clear();
    session.context("Loading session failed")?;

    Ok(SimulationReport {
        session: loader.state(),
        service_calls: service.calls(),
        service_failures: service.failures(),
        breakers: registry.all_stats(),
        cache: cache.stats(),
        operations: fetcher.executor().all_stats().into_iter().collect(),
    })
}

/// Await background tasks, logging any that panicked or were cancelled
///
/// Returns how many did not complete.
async fn join_background<const N: usize>(tasks: [(&'static str, JoinHandle<()>); N]) -> usize {
    let mut failed = 0;
    for (task, handle) in tasks {
        if let Err(e) = handle.await {
            tracing::warn!(task, error = %e, "Background task did not complete");
            failed += 1;
        }
    }
    failed
}

/// Mirror loader snapshots onto the progress bar until the session ends
async fn follow_progress(mut rx: watch::Receiver<LoaderSnapshot>, progress: ProgressBar) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        progress.set_position(u64::from(snapshot.state.progress));
        progress.set_message(format!(
            "{} completed, {} failed",
            snapshot.state.completed_loaders.len(),
            snapshot.state.failed_loaders.len()
        ));
        if snapshot.state.phase.is_terminal() {
            break;
        }
    }
}

/// Print a report as JSON or as a colored summary
pub fn print_report(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", rendered);
        return Ok(());
    }

    let console = CliConsole::new(true);
    console.print_header("Session");
    let session = &report.session;
    console.field("phase", session.phase.to_string().bold());
    console.field("progress", format!("{}%", session.progress));
    console.field("completed", session.completed_loaders.len().to_string().green());
    console.field("failed", session.failed_loaders.len().to_string().red());
    console.field(
        "service calls",
        format!("{} ({} failed)", report.service_calls, report.service_failures),
    );
    if !session.failed_loaders.is_empty() {
        let failed: Vec<&str> = session.failed_loaders.iter().map(String::as_str).collect();
        console.warn(&format!("Failed loaders: {}", failed.join(", ")));
    }

    console.print_header("Circuit breakers");
    for breaker in &report.breakers {
        console.field(
            &breaker.name,
            format!(
                "{} (calls {}, failures {}, rejections {}, failure rate {:.1}%)",
                breaker.state,
                breaker.total_calls,
                breaker.total_failures,
                breaker.total_rejections,
                breaker.failure_rate()
            ),
        );
    }

    console.print_header("Cache");
    let cache = &report.cache;
    console.field("entries", format!("{}/{}", cache.entries, cache.max_entries));
    console.field("size", format!("{} bytes", cache.total_size));
    console.field(
        "hits / misses",
        format!("{} / {} ({:.1}%)", cache.hits, cache.misses, cache.hit_rate),
    );

    console.print_header("Operations");
    for (description, stats) in &report.operations {
        console.field(
            description,
            format!(
                "{} ok, {} failed, {} attempts, avg {:?}",
                stats.success_count, stats.failure_count, stats.total_attempts, stats.average_duration
            ),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::loader::LoadingPhase;

    fn args(loaders: usize, fail_every: u32) -> SimulateArgs {
        SimulateArgs {
            loaders,
            fail_every,
            latency_ms: 10,
            json: true,
        }
    }

    #[test]
    fn test_plan_query_tiers() {
        assert_eq!(plan_query(0).1, 0);
        assert_eq!(plan_query(2).1, 1);
        let (key, priority, dependency, query) = plan_query(7);
        assert_eq!(key, "patients-7");
        assert_eq!(priority, 2);
        assert_eq!(dependency.as_deref(), Some("patients-1"));
        assert_eq!(query.cache_key(), "patients:page=2");
    }

    #[tokio::test]
    async fn test_join_background_counts_failed_tasks() {
        let finished = tokio::spawn(async {});
        let panicked = tokio::spawn(async { panic!("sweep blew up") });

        let failed = join_background([("finished", finished), ("panicked", panicked)]).await;
        assert_eq!(failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_without_failures_completes() {
        let report = run(&KeelConfig::default(), &args(6, 0), false).await.unwrap();

        assert_eq!(report.session.phase, LoadingPhase::Completed);
        assert_eq!(report.session.completed_loaders.len(), 6);
        assert_eq!(report.session.progress, 100);
        assert_eq!(report.service_calls, 6);
        assert_eq!(report.breakers.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_retries_failed_loaders() {
        let report = run(&KeelConfig::default(), &args(4, 3), false).await.unwrap();

        // Call 3 (visits-2) fails; its retry is call 5 and succeeds
        assert_eq!(report.service_calls, 5);
        assert_eq!(report.service_failures, 1);
        assert!(report.session.failed_loaders.is_empty());
        assert_eq!(report.session.completed_loaders.len(), 4);
        assert_eq!(report.breakers[0].total_failures, 1);
        print_report(&report, true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_skips_dependents_of_failed_loader() {
        let report = run(&KeelConfig::default(), &args(4, 2), false).await.unwrap();

        // patients-1 fails on call 2 and again on its retry (call 4);
        // invoices-3 depends on it and never runs
        assert_eq!(report.service_calls, 4);
        assert!(report.session.failed_loaders.contains("patients-1"));
        assert!(!report.session.completed_loaders.contains("invoices-3"));
        assert_eq!(report.session.progress, 75);
    }
}
