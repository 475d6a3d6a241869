mod config;
mod error;
mod gate;
mod harness;
mod operation;
mod outcome;
mod progress;
mod stats;
mod stop;

pub use config::RunConfig;
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use harness::Harness;
pub use operation::Operation;
pub use outcome::{Completed, FailureKind, OperationOutcome};
pub use progress::{OutcomeCounts, ProgressFn, ProgressUpdate, SnapshotFn, Tick};
pub use stats::{FailureCounts, LatencySummary, RunStats, RunSummary};
pub use stop::StopSignal;

pub(crate) use stats::duration_ms;
