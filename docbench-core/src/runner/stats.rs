use hdrhistogram::Histogram;
use serde::{Serialize, Serializer};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::executor::WriteCounts;

use super::outcome::{Completed, FailureKind, OperationOutcome};
use super::progress::OutcomeCounts;

pub(crate) fn duration_ms<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub transient: u64,
    pub permanent: u64,
    pub unknown: u64,
}

impl FailureCounts {
    pub fn total(&self) -> u64 {
        self.transient + self.permanent + self.unknown
    }

    pub fn of_kind(&self, kind: FailureKind) -> u64 {
        match kind {
            FailureKind::Transient => self.transient,
            FailureKind::Permanent => self.permanent,
            FailureKind::Unknown => self.unknown,
        }
    }
}

/// Latency over successful operations only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    #[serde(rename = "total_ms", serialize_with = "duration_ms")]
    pub total: Duration,
    #[serde(rename = "min_ms", serialize_with = "duration_ms")]
    pub min: Duration,
    /// Exact: `total / successes`.
    #[serde(rename = "mean_ms", serialize_with = "duration_ms")]
    pub mean: Duration,
    #[serde(rename = "max_ms", serialize_with = "duration_ms")]
    pub max: Duration,
    #[serde(rename = "p50_ms", serialize_with = "duration_ms")]
    pub p50: Duration,
    #[serde(rename = "p90_ms", serialize_with = "duration_ms")]
    pub p90: Duration,
    #[serde(rename = "p95_ms", serialize_with = "duration_ms")]
    pub p95: Duration,
    #[serde(rename = "p99_ms", serialize_with = "duration_ms")]
    pub p99: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub operation: String,
    pub issued: u64,
    pub successes: u64,
    pub failures: FailureCounts,
    /// Issued but not yet recorded; always 0 once a run has finished.
    pub in_flight: u64,
    pub anomalies: u64,
    pub applied: WriteCounts,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    pub elapsed: Duration,
    pub latency: Option<LatencySummary>,
    /// Summed durations of failed operations.
    #[serde(rename = "failed_time_ms", serialize_with = "duration_ms")]
    pub failed_time: Duration,
    /// Successful operations per second of wall time.
    pub throughput: f64,
}

impl RunSummary {
    pub fn empty(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            issued: 0,
            successes: 0,
            failures: FailureCounts::default(),
            in_flight: 0,
            anomalies: 0,
            applied: WriteCounts::default(),
            elapsed: Duration::ZERO,
            latency: None,
            failed_time: Duration::ZERO,
            throughput: 0.0,
        }
    }

    /// Operations with a recorded outcome.
    pub fn completed(&self) -> u64 {
        self.successes + self.failures.total()
    }

    /// Time spent in every recorded operation, failed ones included.
    pub fn busy_time(&self) -> Duration {
        self.latency.map(|l| l.total).unwrap_or_default() + self.failed_time
    }
}

#[derive(Debug)]
struct LatencyAgg {
    histogram_us: Histogram<u64>,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyAgg {
    fn new() -> Self {
        // Up to one hour in microseconds (3 sigfigs).
        let histogram_us = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)
            .unwrap_or_else(|err| panic!("failed to init histogram: {err}"));
        Self {
            histogram_us,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        let us = (elapsed.as_micros() as u64).max(1);
        self.histogram_us.saturating_record(us);
        self.total = self.total.saturating_add(elapsed);
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    fn summary(&self, successes: u64) -> Option<LatencySummary> {
        #[allow(clippy::len_zero)]
        if successes == 0 || self.histogram_us.len() == 0 {
            return None;
        }

        let q = |quantile: f64| Duration::from_micros(self.histogram_us.value_at_quantile(quantile));
        let mean = Duration::from_nanos((self.total.as_nanos() / u128::from(successes)) as u64);

        Some(LatencySummary {
            total: self.total,
            min: self.min,
            mean,
            max: self.max,
            // Clamp so percentiles never fall outside the exact extremes.
            p50: q(0.50).clamp(self.min, self.max),
            p90: q(0.90).clamp(self.min, self.max),
            p95: q(0.95).clamp(self.min, self.max),
            p99: q(0.99).clamp(self.min, self.max),
        })
    }
}

/// Shared outcome aggregation for one run.
///
/// Counters are atomics; the latency aggregate is the only mutex-guarded state.
#[derive(Debug)]
pub struct RunStats {
    issued: AtomicU64,
    completed: AtomicU64,
    successes: AtomicU64,
    transient: AtomicU64,
    permanent: AtomicU64,
    unknown: AtomicU64,
    anomalies: AtomicU64,
    inserted: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    failed_nanos: AtomicU64,
    latency: Mutex<LatencyAgg>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            issued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            transient: AtomicU64::new(0),
            permanent: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            failed_nanos: AtomicU64::new(0),
            latency: Mutex::new(LatencyAgg::new()),
        }
    }
}

impl RunStats {
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one outcome and returns the running counts including it.
    pub fn record(&self, outcome: &OperationOutcome) -> OutcomeCounts {
        match outcome {
            OperationOutcome::Success {
                duration,
                completed,
            } => self.record_success(*duration, completed),
            OperationOutcome::Failure {
                kind,
                duration,
                applied,
                ..
            } => {
                let counter = match kind {
                    FailureKind::Transient => &self.transient,
                    FailureKind::Permanent => &self.permanent,
                    FailureKind::Unknown => &self.unknown,
                };
                self.failed_nanos
                    .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
                self.record_applied(*applied);
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }

        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let successes = self.successes.load(Ordering::Relaxed);
        OutcomeCounts {
            completed,
            successes: successes.min(completed),
            failures: completed.saturating_sub(successes),
        }
    }

    fn record_success(&self, duration: Duration, completed: &Completed) {
        {
            let mut agg = self
                .latency
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            agg.record(duration);
            self.successes.fetch_add(1, Ordering::Relaxed);
        }

        if completed.anomaly.is_some() {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
        }
        self.record_applied(completed.applied);
    }

    fn record_applied(&self, applied: WriteCounts) {
        if applied.inserted != 0 {
            self.inserted.fetch_add(applied.inserted, Ordering::Relaxed);
        }
        if applied.updated != 0 {
            self.updated.fetch_add(applied.updated, Ordering::Relaxed);
        }
        if applied.deleted != 0 {
            self.deleted.fetch_add(applied.deleted, Ordering::Relaxed);
        }
    }

    pub fn summarize(&self, operation: &str, elapsed: Duration) -> RunSummary {
        // Hold the latency lock while reading counters so the summary is taken at one
        // point with respect to success recording.
        let agg = self
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let successes = self.successes.load(Ordering::Relaxed);
        let failures = FailureCounts {
            transient: self.transient.load(Ordering::Relaxed),
            permanent: self.permanent.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        };
        // Issued is read last; it is bumped before an outcome exists, never after.
        let issued = self.issued.load(Ordering::Acquire);
        let recorded = successes + failures.total();
        let issued = issued.max(recorded);

        let secs = elapsed.as_secs_f64().max(1e-9);

        RunSummary {
            operation: operation.to_string(),
            issued,
            successes,
            failures,
            in_flight: issued - recorded,
            anomalies: self.anomalies.load(Ordering::Relaxed),
            applied: WriteCounts {
                inserted: self.inserted.load(Ordering::Relaxed),
                updated: self.updated.load(Ordering::Relaxed),
                deleted: self.deleted.load(Ordering::Relaxed),
            },
            elapsed,
            latency: agg.summary(successes),
            failed_time: Duration::from_nanos(self.failed_nanos.load(Ordering::Relaxed)),
            throughput: (successes as f64) / secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(ms: u64) -> OperationOutcome {
        OperationOutcome::Success {
            duration: Duration::from_millis(ms),
            completed: Completed::applied(WriteCounts::inserted(1)),
        }
    }

    fn failure(kind: FailureKind) -> OperationOutcome {
        OperationOutcome::Failure {
            kind,
            message: "boom".to_string(),
            duration: Duration::from_millis(4),
            applied: WriteCounts::default(),
        }
    }

    #[test]
    fn summary_counts_every_outcome_once() {
        let stats = RunStats::default();
        let outcomes = [
            success(5),
            failure(FailureKind::Transient),
            success(15),
            failure(FailureKind::Permanent),
            failure(FailureKind::Unknown),
        ];
        for o in &outcomes {
            stats.record_issued();
            stats.record(o);
        }

        let s = stats.summarize("op", Duration::from_secs(1));
        assert_eq!(s.issued, 5);
        assert_eq!(s.successes, 2);
        assert_eq!(s.failures.total(), 3);
        assert_eq!(s.failures.of_kind(FailureKind::Transient), 1);
        assert_eq!(s.failures.of_kind(FailureKind::Permanent), 1);
        assert_eq!(s.failures.of_kind(FailureKind::Unknown), 1);
        assert_eq!(s.in_flight, 0);
        assert_eq!(s.completed(), s.issued);
        assert_eq!(s.applied.inserted, 2);
    }

    #[test]
    fn latency_mean_is_exact_and_bounds_percentiles() {
        let stats = RunStats::default();
        for ms in [10, 20, 30] {
            stats.record_issued();
            stats.record(&success(ms));
        }

        let s = stats.summarize("op", Duration::from_secs(1));
        let lat = s.latency.unwrap_or_else(|| panic!("expected latency"));
        assert_eq!(lat.total, Duration::from_millis(60));
        assert_eq!(lat.mean, Duration::from_millis(20));
        assert_eq!(lat.min, Duration::from_millis(10));
        assert_eq!(lat.max, Duration::from_millis(30));
        assert!(lat.p50 >= lat.min && lat.p50 <= lat.max);
        assert!(lat.p99 <= lat.max);
    }

    #[test]
    fn in_flight_is_reported_for_unrecorded_issues() {
        let stats = RunStats::default();
        stats.record_issued();
        stats.record_issued();
        stats.record(&success(1));

        let s = stats.summarize("op", Duration::from_millis(10));
        assert_eq!(s.issued, 2);
        assert_eq!(s.in_flight, 1);
        assert_eq!(s.completed() + s.in_flight, s.issued);
    }

    #[test]
    fn failures_do_not_contribute_latency() {
        let stats = RunStats::default();
        stats.record_issued();
        let counts = stats.record(&failure(FailureKind::Transient));
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failures, 1);

        let s = stats.summarize("op", Duration::from_millis(10));
        assert!(s.latency.is_none());
        assert_eq!(s.throughput, 0.0);
    }

    #[test]
    fn failures_keep_their_time_and_partial_writes() {
        let stats = RunStats::default();
        stats.record_issued();
        stats.record(&success(6));
        stats.record_issued();
        stats.record(&OperationOutcome::Failure {
            kind: FailureKind::Permanent,
            message: "duplicate key".to_string(),
            duration: Duration::from_millis(2),
            applied: WriteCounts::inserted(5),
        });

        let s = stats.summarize("op", Duration::from_millis(10));
        assert_eq!(s.failures.permanent, 1);
        assert_eq!(s.failed_time, Duration::from_millis(2));
        assert_eq!(s.busy_time(), Duration::from_millis(8));
        assert_eq!(s.applied.inserted, 6);
        assert_eq!(s.latency.map(|l| l.total), Some(Duration::from_millis(6)));
    }
}
