use crate::executor::ExecError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("executor unavailable: {0}")]
    Fatal(ExecError),

    /// An executor call outside the timed iterations (setup or verification) failed.
    #[error("executor call failed: {0}")]
    Executor(ExecError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
