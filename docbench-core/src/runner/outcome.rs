use std::time::Duration;

use serde::Serialize;

use crate::executor::WriteCounts;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or throttling trouble; retried after the configured backoff.
    Transient,
    /// Validation or logic failure; the run moves on immediately.
    Permanent,
    Unknown,
}

impl FailureKind {
    /// Whether the issuing worker should back off before its next iteration.
    #[must_use]
    pub fn backs_off(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// What a successful operation reports back to the harness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completed {
    pub applied: WriteCounts,
    /// The call succeeded but its result points at a data-consistency problem.
    pub anomaly: Option<String>,
}

impl Completed {
    pub fn applied(applied: WriteCounts) -> Self {
        Self {
            applied,
            anomaly: None,
        }
    }

    pub fn anomaly(message: impl Into<String>) -> Self {
        Self {
            applied: WriteCounts::default(),
            anomaly: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Success {
        duration: Duration,
        completed: Completed,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Time until the call failed (or timed out).
        duration: Duration,
        applied: WriteCounts,
    },
}

impl OperationOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}
