use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::executor::ExecError;

use super::config::RunConfig;
use super::error::{Error, Result};
use super::gate::IterationGate;
use super::operation::Operation;
use super::outcome::{FailureKind, OperationOutcome};
use super::progress::{ProgressFn, ProgressUpdate, SnapshotFn, Tick};
use super::stats::{RunStats, RunSummary};
use super::stop::StopSignal;

/// Drives an [`Operation`] for a configured number of iterations (or until stopped),
/// classifying and aggregating every outcome.
#[derive(Clone)]
pub struct Harness {
    config: RunConfig,
    progress: Option<ProgressFn>,
    stop: Arc<StopSignal>,
}

struct WorkerCtx {
    operation: Arc<str>,
    stats: Arc<RunStats>,
    gate: IterationGate,
    progress: Option<ProgressFn>,
    stop: Arc<StopSignal>,
    error_backoff: Duration,
    progress_every: u64,
    op_timeout: Option<Duration>,
}

impl Harness {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            progress: None,
            stop: Arc::new(StopSignal::new()),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: Arc<StopSignal>) -> Self {
        self.stop = stop;
        self
    }

    /// Same harness (progress sink and stop signal included) bounded to `iterations`.
    #[must_use]
    pub fn with_iterations(&self, iterations: u64) -> Self {
        let mut out = self.clone();
        out.config.iterations = Some(iterations);
        out
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    /// Runs to completion and returns the final summary.
    ///
    /// With `iterations: None` this only returns once the stop signal fires.
    pub async fn run<O: Operation>(&self, op: Arc<O>) -> Result<RunSummary> {
        self.drive(op, None).await
    }

    /// Like [`Harness::run`], additionally handing a summary snapshot to `on_snapshot`
    /// every `snapshot_every`. Meant for unbounded runs ended by the stop signal; the
    /// returned summary is taken after in-flight operations have drained.
    pub async fn run_continuous<O: Operation>(
        &self,
        op: Arc<O>,
        on_snapshot: SnapshotFn,
    ) -> Result<RunSummary> {
        self.drive(op, Some(on_snapshot)).await
    }

    async fn drive<O: Operation>(
        &self,
        op: Arc<O>,
        on_snapshot: Option<SnapshotFn>,
    ) -> Result<RunSummary> {
        self.config.validate()?;

        let operation: Arc<str> = Arc::from(op.name());
        if self.config.iterations == Some(0) {
            debug!(operation = %operation, "no iterations requested");
            return Ok(RunSummary::empty(&operation));
        }

        if let Err(err) = op.preflight().await {
            error!(operation = %operation, error = %err, "preflight failed");
            return Err(Error::Fatal(err));
        }

        let width = match self.config.iterations {
            Some(n) => self.config.concurrency.min(n),
            None => self.config.concurrency,
        };

        let stats = Arc::new(RunStats::default());
        let ctx = Arc::new(WorkerCtx {
            operation: operation.clone(),
            stats: stats.clone(),
            gate: IterationGate::new(self.config.iterations, self.stop.clone()),
            progress: self.progress.clone(),
            stop: self.stop.clone(),
            error_backoff: self.config.error_backoff,
            progress_every: self.config.progress_every,
            op_timeout: self.config.op_timeout,
        });

        info!(
            operation = %operation,
            iterations = ?self.config.iterations,
            concurrency = width,
            "run started"
        );

        let started = Instant::now();
        let mut workers = Vec::with_capacity(width as usize);
        for _ in 0..width {
            workers.push(tokio::spawn(worker_loop(op.clone(), ctx.clone())));
        }

        let ticker = on_snapshot.map(|on_snapshot| {
            let stats = stats.clone();
            let operation = operation.clone();
            let every = self.config.snapshot_every;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(started + every, every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    on_snapshot(stats.summarize(&operation, started.elapsed()));
                }
            })
        });

        let mut join_error = None;
        for worker in workers {
            if let Err(err) = worker.await {
                join_error.get_or_insert(err);
            }
        }

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if let Some(err) = join_error {
            return Err(Error::Join(err));
        }

        let summary = stats.summarize(&operation, started.elapsed());
        info!(
            operation = %operation,
            successes = summary.successes,
            failures = summary.failures.total(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }
}

async fn worker_loop<O: Operation>(op: Arc<O>, ctx: Arc<WorkerCtx>) {
    while let Some(seq) = ctx.gate.next() {
        let request = op.prepare(seq);
        ctx.stats.record_issued();

        let started = Instant::now();
        let result = match ctx.op_timeout {
            Some(limit) => tokio::time::timeout(limit, op.execute(request))
                .await
                .unwrap_or_else(|_| {
                    Err(ExecError::transient(format!(
                        "operation timed out after {limit:?}"
                    )))
                }),
            None => op.execute(request).await,
        };
        let duration = started.elapsed();

        let outcome = match result {
            Ok(completed) => {
                if let Some(anomaly) = &completed.anomaly {
                    warn!(operation = %ctx.operation, seq, "{anomaly}");
                }
                OperationOutcome::Success {
                    duration,
                    completed,
                }
            }
            Err(err) => {
                match err.kind {
                    FailureKind::Permanent => {
                        warn!(operation = %ctx.operation, seq, error = %err.message, "operation failed");
                    }
                    FailureKind::Transient | FailureKind::Unknown => {
                        debug!(operation = %ctx.operation, seq, kind = %err.kind, error = %err.message, "operation failed");
                    }
                }
                OperationOutcome::Failure {
                    kind: err.kind,
                    message: err.message,
                    duration,
                    applied: err.applied,
                }
            }
        };

        let failure = outcome.failure_kind();
        let counts = ctx.stats.record(&outcome);

        if let Some(progress) = &ctx.progress {
            let milestone = (counts.completed % ctx.progress_every == 0).then_some(counts.completed);
            progress(ProgressUpdate {
                operation: ctx.operation.clone(),
                seq,
                tick: failure.map_or(Tick::Ok, Tick::Err),
                counts,
                milestone,
            });
        }

        if failure.is_some_and(FailureKind::backs_off) && !ctx.error_backoff.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(ctx.error_backoff) => {}
                _ = ctx.stop.wait() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::executor::WriteCounts;
    use crate::runner::Completed;

    /// Sleeps `latency` per call and fails the listed sequence numbers.
    struct Scripted {
        latency: Duration,
        failures: Vec<(u64, FailureKind)>,
        calls: AtomicU64,
        seen: Mutex<Vec<u64>>,
        unreachable: bool,
    }

    impl Scripted {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                failures: Vec::new(),
                calls: AtomicU64::new(0),
                seen: Mutex::new(Vec::new()),
                unreachable: false,
            }
        }

        fn failing(mut self, seq: u64, kind: FailureKind) -> Self {
            self.failures.push((seq, kind));
            self
        }
    }

    impl Operation for Scripted {
        type Request = u64;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn preflight(&self) -> std::result::Result<(), ExecError> {
            if self.unreachable {
                return Err(ExecError::transient("connection refused"));
            }
            Ok(())
        }

        fn prepare(&self, seq: u64) -> u64 {
            seq
        }

        async fn execute(&self, seq: u64) -> std::result::Result<Completed, ExecError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(seq);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match self.failures.iter().find(|(s, _)| *s == seq) {
                Some((_, kind)) => Err(ExecError::new(*kind, format!("seq {seq} failed"))),
                None => Ok(Completed::applied(WriteCounts::inserted(1))),
            }
        }
    }

    fn cfg(iterations: u64) -> RunConfig {
        RunConfig {
            iterations: Some(iterations),
            ..RunConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_successes_report_exact_mean_latency() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::from_millis(10)));
        let summary = Harness::new(cfg(5)).run(op).await?;

        assert_eq!(summary.successes, 5);
        assert_eq!(summary.failures.total(), 0);
        let latency = summary
            .latency
            .unwrap_or_else(|| panic!("expected latency"));
        assert_eq!(latency.mean, Duration::from_millis(10));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_and_are_counted() -> Result<()> {
        let backoff = Duration::from_millis(100);
        let op = Arc::new(
            Scripted::new(Duration::ZERO)
                .failing(1, FailureKind::Transient)
                .failing(3, FailureKind::Transient),
        );
        let config = RunConfig {
            error_backoff: backoff,
            ..cfg(5)
        };
        let summary = Harness::new(config).run(op).await?;

        assert_eq!(summary.successes, 3);
        assert_eq!(summary.failures.transient, 2);
        assert_eq!(summary.completed(), 5);
        assert!(summary.elapsed >= backoff * 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_do_not_back_off() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::ZERO).failing(0, FailureKind::Permanent));
        let config = RunConfig {
            error_backoff: Duration::from_secs(60),
            ..cfg(3)
        };
        let summary = Harness::new(config).run(op).await?;

        assert_eq!(summary.failures.permanent, 1);
        assert_eq!(summary.successes, 2);
        assert!(summary.elapsed < Duration::from_secs(60));
        Ok(())
    }

    #[tokio::test]
    async fn zero_iterations_issue_nothing() -> Result<()> {
        let op = Arc::new(Scripted {
            unreachable: true,
            ..Scripted::new(Duration::ZERO)
        });
        let summary = Harness::new(cfg(0)).run(op.clone()).await?;

        assert_eq!(summary, RunSummary::empty("scripted"));
        assert_eq!(op.calls.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_preflight_is_fatal() {
        let op = Arc::new(Scripted {
            unreachable: true,
            ..Scripted::new(Duration::ZERO)
        });
        let res = Harness::new(cfg(3)).run(op.clone()).await;

        assert!(matches!(res, Err(Error::Fatal(_))));
        assert_eq!(op.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient_failure() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::from_secs(10)));
        let config = RunConfig {
            op_timeout: Some(Duration::from_millis(50)),
            error_backoff: Duration::ZERO,
            ..cfg(2)
        };
        let summary = Harness::new(config).run(op).await?;

        assert_eq!(summary.failures.transient, 2);
        assert_eq!(summary.successes, 0);
        assert!(summary.elapsed < Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_attribute_each_seq_once() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::from_millis(1)).failing(7, FailureKind::Unknown));
        let ticks: Arc<Mutex<Vec<(u64, Tick)>>> = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressFn = {
            let ticks = ticks.clone();
            Arc::new(move |u| {
                ticks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((u.seq, u.tick));
            })
        };

        let config = RunConfig {
            concurrency: 8,
            error_backoff: Duration::ZERO,
            ..cfg(100)
        };
        let summary = Harness::new(config)
            .with_progress(progress)
            .run(op.clone())
            .await?;

        assert_eq!(summary.completed(), 100);
        assert_eq!(summary.failures.unknown, 1);

        let ticks = ticks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let seqs: HashSet<u64> = ticks.iter().map(|(s, _)| *s).collect();
        assert_eq!(ticks.len(), 100);
        assert_eq!(seqs.len(), 100);
        assert!(
            ticks
                .iter()
                .all(|(s, t)| (*s == 7) == matches!(t, Tick::Err(FailureKind::Unknown)))
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn milestones_follow_progress_cadence() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::ZERO));
        let milestones: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressFn = {
            let milestones = milestones.clone();
            Arc::new(move |u| {
                if let Some(m) = u.milestone {
                    milestones
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(m);
                }
            })
        };
        let config = RunConfig {
            progress_every: 10,
            ..cfg(35)
        };
        Harness::new(config).with_progress(progress).run(op).await?;

        let got = milestones
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        assert_eq!(got, vec![10, 20, 30]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_run_stops_and_drains() -> Result<()> {
        let op = Arc::new(Scripted::new(Duration::from_millis(10)));
        let snapshots: Arc<Mutex<Vec<RunSummary>>> = Arc::new(Mutex::new(Vec::new()));
        let on_snapshot: SnapshotFn = {
            let snapshots = snapshots.clone();
            Arc::new(move |s| {
                snapshots
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(s);
            })
        };
        let config = RunConfig {
            iterations: None,
            snapshot_every: Duration::from_millis(100),
            ..RunConfig::default()
        };
        let harness = Harness::new(config);
        let stop = harness.stop_signal();

        let run = tokio::spawn({
            let harness = harness.clone();
            async move { harness.run_continuous(op, on_snapshot).await }
        });

        tokio::time::sleep(Duration::from_millis(355)).await;
        stop.stop();
        let summary = run.await??;

        assert_eq!(summary.in_flight, 0);
        assert_eq!(summary.completed(), summary.issued);
        assert!(summary.successes >= 35);

        let snapshots = snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        assert_eq!(snapshots.len(), 3);
        assert!(
            snapshots
                .iter()
                .all(|s| s.completed() + s.in_flight == s.issued)
        );
        Ok(())
    }
}
