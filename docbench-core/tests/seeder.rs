mod support;

use std::sync::{Arc, Mutex};

use docbench_core::runner::{Error, Result};
use docbench_core::workloads::{ItemGenerator, SeedOptions, seed};
use docbench_core::{ExecError, Executor, Target, WriteCounts};
use docbench_memstore::Call;
use docbench_value::{DocId, Document, ID_FIELD};

fn options(records: u64, batch_size: u64) -> SeedOptions {
    SeedOptions {
        target: Target::new("testdb", "items"),
        records,
        batch_size,
    }
}

#[tokio::test]
async fn twenty_five_records_flush_as_ten_ten_five() -> Result<()> {
    let store = support::store();
    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let generator = {
        let seen = seen.clone();
        move |i: u64| {
            seen.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(i);
            Document::new().with(ID_FIELD, i as i64)
        }
    };

    let report = seed(&support::harness(1), store.clone(), &options(25, 10), generator).await?;

    assert_eq!(report.batches, 3);
    assert_eq!(report.records_requested, 25);
    assert_eq!(report.records_inserted, 25);
    assert_eq!(report.summary.successes, 3);
    assert_eq!(store.calls(Call::InsertMany), 3);
    assert_eq!(store.len(&report.target), 25);

    let seen = seen
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    assert_eq!(seen, (0..25).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn zero_records_issue_no_batches() -> Result<()> {
    let store = support::store();
    let report = seed(
        &support::harness(1),
        store.clone(),
        &options(0, 10),
        ItemGenerator::default(),
    )
    .await?;

    assert_eq!(report.batches, 0);
    assert_eq!(report.records_inserted, 0);
    assert_eq!(store.calls(Call::InsertMany), 0);
    Ok(())
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let res = seed(
        &support::harness(1),
        support::store(),
        &options(10, 0),
        ItemGenerator::default(),
    )
    .await;
    assert!(matches!(res, Err(Error::InvalidConfig(_))));
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_reported_not_fatal() -> Result<()> {
    let store = support::store();
    store.fail_nth(Call::InsertMany, 1, ExecError::permanent("document too large"));

    let report = seed(
        &support::harness(1),
        store.clone(),
        &options(30, 10),
        ItemGenerator::default(),
    )
    .await?;

    assert_eq!(report.batches, 3);
    assert_eq!(report.summary.failures.permanent, 1);
    assert_eq!(report.records_inserted, 20);
    assert_eq!(store.len(&report.target), 20);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn partially_applied_batch_counts_written_records() -> Result<()> {
    let store = support::store();
    let target = Target::new("testdb", "items");
    store
        .insert_one(&target, Document::new().with(ID_FIELD, 5i64))
        .await
        .unwrap_or_else(|e| panic!("pre-insert failed: {e}"));

    let report = seed(
        &support::harness(1),
        store.clone(),
        &options(10, 10),
        ItemGenerator::default(),
    )
    .await?;

    assert_eq!(report.batches, 1);
    assert_eq!(report.summary.failures.permanent, 1);
    assert_eq!(report.summary.applied, WriteCounts::inserted(5));
    assert_eq!(report.records_inserted, 5);
    assert!(store.get(&target, &DocId::from(4i64)).is_some());
    assert!(store.get(&target, &DocId::from(6i64)).is_none());
    assert_eq!(store.len(&target), 6);
    Ok(())
}
