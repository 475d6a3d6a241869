use std::sync::Arc;

use super::outcome::FailureKind;
use super::stats::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Ok,
    Err(FailureKind),
}

impl Tick {
    /// Single-character marker for streaming progress output.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Self::Ok => '.',
            Self::Err(_) => 'E',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub completed: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub operation: Arc<str>,
    /// Iteration this outcome belongs to (0-based).
    pub seq: u64,
    pub tick: Tick,
    pub counts: OutcomeCounts,
    /// `Some(completed)` every `progress_every` completed operations.
    pub milestone: Option<u64>,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Receives periodic summaries of an unbounded run.
pub type SnapshotFn = Arc<dyn Fn(RunSummary) + Send + Sync + 'static>;
