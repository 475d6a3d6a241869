use std::time::Duration;

use super::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// `None` runs until the stop signal fires.
    pub iterations: Option<u64>,
    /// Number of operations allowed in flight at once.
    pub concurrency: u64,
    /// Delay applied by a worker after a transient (or unclassified) failure.
    pub error_backoff: Duration,
    /// Emit a progress milestone every N completed operations.
    pub progress_every: u64,
    /// Summary snapshot cadence for unbounded runs.
    pub snapshot_every: Duration,
    /// Optional per-operation deadline. Expiry counts as a transient failure.
    pub op_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: Some(1),
            concurrency: 1,
            error_backoff: Duration::from_millis(100),
            progress_every: 1000,
            snapshot_every: Duration::from_secs(5),
            op_timeout: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "`concurrency` must be a positive integer".to_string(),
            ));
        }
        if self.progress_every == 0 {
            return Err(Error::InvalidConfig(
                "`progress_every` must be a positive integer".to_string(),
            ));
        }
        if self.snapshot_every.is_zero() {
            return Err(Error::InvalidConfig(
                "`snapshot_every` must be a positive duration".to_string(),
            ));
        }
        if self.op_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(
                "`op_timeout` must be a positive duration".to_string(),
            ));
        }
        Ok(())
    }
}
