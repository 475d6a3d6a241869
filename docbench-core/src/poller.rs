//! Background polling of server metrics for the dashboard.
//!
//! The poller task is the only thing that talks to the [`StatusSource`]. Readers get the
//! latest snapshot from a `watch` channel and never wait on a fetch in progress.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::executor::{Connections, ExecResult, Executor, OpCounters, Target};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerMetrics {
    pub doc_count: u64,
    pub opcounters: OpCounters,
    pub connections: Connections,
}

pub trait StatusSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = ExecResult<ServerMetrics>> + Send;
}

/// Server status plus the document count of one watched target.
pub struct ExecutorStatus<E> {
    executor: Arc<E>,
    target: Target,
}

impl<E: Executor> ExecutorStatus<E> {
    pub fn new(executor: Arc<E>, target: Target) -> Self {
        Self { executor, target }
    }
}

impl<E: Executor> StatusSource for ExecutorStatus<E> {
    async fn fetch(&self) -> ExecResult<ServerMetrics> {
        let status = self.executor.server_status().await?;
        let doc_count = self.executor.count(&self.target).await?;
        Ok(ServerMetrics {
            doc_count,
            opcounters: status.opcounters,
            connections: status.connections,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    Ok(ServerMetrics),
    Failed { error: String },
}

/// One fetch result. Either fully populated or marked failed, never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Millisecond precision, strictly increasing across snapshots of one poller.
    pub captured_at: DateTime<Utc>,
    pub state: SnapshotState,
}

impl MetricsSnapshot {
    pub fn is_ok(&self) -> bool {
        matches!(self.state, SnapshotState::Ok(_))
    }

    pub fn metrics(&self) -> Option<&ServerMetrics> {
        match &self.state {
            SnapshotState::Ok(m) => Some(m),
            SnapshotState::Failed { .. } => None,
        }
    }
}

type RefreshReply = oneshot::Sender<Arc<MetricsSnapshot>>;

/// Cheap, cloneable read side of a [`MetricsPoller`].
#[derive(Debug, Clone)]
pub struct MetricsReader {
    rx: watch::Receiver<Arc<MetricsSnapshot>>,
    refresh: mpsc::UnboundedSender<RefreshReply>,
}

impl MetricsReader {
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MetricsSnapshot>> {
        self.rx.clone()
    }

    /// Asks the poller for a fetch and waits for its snapshot.
    ///
    /// The fetch starts after this call; a timer fetch already in flight is not reused.
    /// If the poller has shut down the cached snapshot is returned as is.
    pub async fn refresh(&self) -> Arc<MetricsSnapshot> {
        let (reply, fresh) = oneshot::channel();
        if self.refresh.send(reply).is_ok()
            && let Ok(snapshot) = fresh.await
        {
            return snapshot;
        }
        debug!("metrics poller is gone; returning cached snapshot");
        self.latest()
    }
}

pub struct MetricsPoller {
    reader: MetricsReader,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsPoller {
    /// Fetches the first snapshot, then keeps polling every `interval` in the background.
    pub async fn start<S: StatusSource>(source: S, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let first = capture(&source, None).await;
        let (tx, rx) = watch::channel(Arc::new(first));
        let (refresh, requests) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(poll_loop(source, interval, tx, requests, shutdown_rx));

        Self {
            reader: MetricsReader { rx, refresh },
            shutdown,
            task,
        }
    }

    pub fn reader(&self) -> MetricsReader {
        self.reader.clone()
    }

    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.reader.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MetricsSnapshot>> {
        self.reader.subscribe()
    }

    pub async fn refresh(&self) -> Arc<MetricsSnapshot> {
        self.reader.refresh().await
    }

    /// Stops the timer task. A fetch in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "metrics poller task failed");
        }
    }
}

async fn poll_loop<S: StatusSource>(
    source: S,
    interval: Duration,
    tx: watch::Sender<Arc<MetricsSnapshot>>,
    mut requests: mpsc::UnboundedReceiver<RefreshReply>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let mut waiting = Vec::new();
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            Some(reply) = requests.recv() => waiting.push(reply),
        }
        // Requests queued so far all predate the fetch below and share it.
        while let Ok(reply) = requests.try_recv() {
            waiting.push(reply);
        }

        let previous = tx.borrow().captured_at;
        let snapshot = Arc::new(capture(&source, Some(previous)).await);
        tx.send_replace(snapshot.clone());
        for reply in waiting {
            let _ = reply.send(snapshot.clone());
        }
    }
    debug!("metrics poller stopped");
}

async fn capture<S: StatusSource>(
    source: &S,
    previous: Option<DateTime<Utc>>,
) -> MetricsSnapshot {
    let state = match source.fetch().await {
        Ok(metrics) => SnapshotState::Ok(metrics),
        Err(err) => {
            warn!(error = %err, "metrics fetch failed");
            SnapshotState::Failed { error: err.message }
        }
    };

    let mut captured_at = Utc::now().trunc_subsecs(3);
    if let Some(previous) = previous
        && captured_at <= previous
    {
        captured_at = previous + chrono::Duration::milliseconds(1);
    }

    MetricsSnapshot { captured_at, state }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use super::*;
    use crate::executor::ExecError;

    #[derive(Default)]
    struct FlakySource {
        calls: AtomicU64,
        down: AtomicBool,
    }

    impl StatusSource for Arc<FlakySource> {
        async fn fetch(&self) -> ExecResult<ServerMetrics> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.down.load(Ordering::SeqCst) {
                return Err(ExecError::transient("connection refused"));
            }
            Ok(ServerMetrics {
                doc_count: n,
                ..ServerMetrics::default()
            })
        }
    }

    #[tokio::test]
    async fn start_captures_first_snapshot() {
        let source = Arc::new(FlakySource::default());
        let poller = MetricsPoller::start(source.clone(), Duration::from_secs(60)).await;

        let first = poller.latest();
        assert_eq!(first.metrics().map(|m| m.doc_count), Some(1));
        poller.shutdown().await;
    }

    #[tokio::test]
    async fn failure_then_recovery_with_increasing_timestamps() {
        let source = Arc::new(FlakySource::default());
        let poller = MetricsPoller::start(source.clone(), Duration::from_secs(60)).await;
        let ok = poller.latest();

        source.down.store(true, Ordering::SeqCst);
        let failed = poller.refresh().await;
        assert!(!failed.is_ok());
        assert!(matches!(&failed.state, SnapshotState::Failed { error } if error.contains("refused")));
        assert!(failed.captured_at > ok.captured_at);

        source.down.store(false, Ordering::SeqCst);
        let recovered = poller.refresh().await;
        assert!(recovered.is_ok());
        assert!(recovered.captured_at > failed.captured_at);
        assert_eq!(recovered.metrics().map(|m| m.doc_count), Some(3));

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_replaces_snapshot_each_interval() {
        let source = Arc::new(FlakySource::default());
        let poller = MetricsPoller::start(source.clone(), DEFAULT_INTERVAL).await;
        let mut rx = poller.subscribe();
        rx.borrow_and_update();

        for expected in 2..=4 {
            let changed = tokio::time::timeout(DEFAULT_INTERVAL * 2, rx.changed()).await;
            assert!(matches!(changed, Ok(Ok(()))));
            let snapshot = rx.borrow_and_update().clone();
            assert_eq!(snapshot.metrics().map(|m| m.doc_count), Some(expected));
        }

        poller.shutdown().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    struct SlowSource {
        calls: AtomicU64,
        latency: Duration,
    }

    impl StatusSource for Arc<SlowSource> {
        async fn fetch(&self) -> ExecResult<ServerMetrics> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            Ok(ServerMetrics {
                doc_count: n,
                ..ServerMetrics::default()
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_timer_fetch_waits_for_a_newer_one() {
        let source = Arc::new(SlowSource {
            calls: AtomicU64::new(0),
            latency: Duration::from_secs(1),
        });
        // First fetch ends at 1s; the timer fetch runs from 4s to 5s.
        let poller = MetricsPoller::start(source.clone(), Duration::from_secs(3)).await;
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let refreshed = poller.refresh().await;
        assert_eq!(refreshed.metrics().map(|m| m.doc_count), Some(3));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(poller.latest(), refreshed);

        poller.shutdown().await;
    }

    #[tokio::test]
    async fn reader_outlives_shutdown_with_cached_snapshot() {
        let source = Arc::new(FlakySource::default());
        let poller = MetricsPoller::start(source, Duration::from_secs(60)).await;
        let reader = poller.reader();
        poller.shutdown().await;

        let cached = reader.refresh().await;
        assert!(cached.is_ok());
        assert_eq!(cached, reader.latest());
    }
}
