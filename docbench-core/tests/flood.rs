mod support;

use std::sync::Arc;
use std::time::Duration;

use docbench_core::runner::{Error, Harness, Result, RunConfig, SnapshotFn};
use docbench_core::workloads::{FloodOptions, InsertFlood};
use docbench_core::{ExecError, Executor};
use docbench_memstore::Call;

#[tokio::test(start_paused = true)]
async fn steady_latency_gives_exact_mean() -> Result<()> {
    let store = support::store();
    store.set_latency(Call::InsertOne, Duration::from_millis(10));
    let op = Arc::new(InsertFlood::new(store.clone(), FloodOptions::default()));

    let summary = support::harness(5).run(op.clone()).await?;

    assert_eq!(summary.successes, 5);
    assert_eq!(summary.failures.total(), 0);
    let latency = summary.latency.unwrap_or_else(|| panic!("no latency"));
    assert_eq!(latency.mean, Duration::from_millis(10));
    assert_eq!(latency.total, Duration::from_millis(50));
    assert_eq!(store.len(op.target()), 5);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_counted_and_backed_off() -> Result<()> {
    let store = support::store();
    store.fail_nth(Call::InsertOne, 1, ExecError::transient("write conflict"));
    store.fail_nth(Call::InsertOne, 3, ExecError::transient("write conflict"));
    let op = Arc::new(InsertFlood::new(store.clone(), FloodOptions::default()));

    let summary = support::harness(5).run(op.clone()).await?;

    assert_eq!(summary.successes, 3);
    assert_eq!(summary.failures.transient, 2);
    assert_eq!(summary.issued, 5);
    assert!(summary.elapsed >= Duration::from_millis(200));
    assert_eq!(store.len(op.target()), 3);
    Ok(())
}

#[tokio::test]
async fn unreachable_executor_is_fatal_before_any_insert() {
    let store = support::store();
    store.set_unreachable(true);
    let op = Arc::new(InsertFlood::new(store.clone(), FloodOptions::default()));

    let res = support::harness(10).run(op).await;

    assert!(matches!(res, Err(Error::Fatal(_))));
    assert_eq!(store.calls(Call::InsertOne), 0);
}

#[tokio::test]
async fn zero_iterations_never_touch_the_executor() -> Result<()> {
    let store = support::store();
    let op = Arc::new(InsertFlood::new(store.clone(), FloodOptions::default()));

    let summary = support::harness(0).run(op).await?;

    assert_eq!(summary.issued, 0);
    assert!(summary.latency.is_none());
    assert_eq!(store.calls(Call::Ping), 0);
    assert_eq!(store.calls(Call::InsertOne), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unbounded_flood_drains_on_stop() -> Result<()> {
    let store = support::store();
    store.set_latency(Call::InsertOne, Duration::from_millis(1));
    let op = Arc::new(InsertFlood::new(store.clone(), FloodOptions::default()));

    let harness = Harness::new(RunConfig {
        iterations: None,
        concurrency: 4,
        snapshot_every: Duration::from_millis(20),
        ..RunConfig::default()
    });
    let stop = harness.stop_signal();
    let on_snapshot: SnapshotFn = Arc::new(|s| {
        assert_eq!(s.completed() + s.in_flight, s.issued);
    });

    let run = tokio::spawn({
        let op = op.clone();
        async move { harness.run_continuous(op, on_snapshot).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();
    let summary = run.await??;

    assert_eq!(summary.in_flight, 0);
    assert_eq!(summary.issued, summary.successes);
    assert_eq!(store.len(op.target()), summary.successes as usize);
    assert_eq!(store.count(op.target()).await.ok(), Some(summary.successes));
    Ok(())
}
