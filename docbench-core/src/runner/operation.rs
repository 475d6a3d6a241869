use std::future::Future;

use crate::executor::ExecError;

use super::outcome::Completed;

/// A named, parameterized unit of work driven by the harness.
///
/// `prepare` synthesizes the request for an iteration and is not timed; `execute`
/// performs the external call and is timed from just before the call to just after
/// it returns.
pub trait Operation: Send + Sync + 'static {
    type Request: Send + 'static;

    fn name(&self) -> &str;

    /// Runs once before the first iteration. A failure here aborts the run as fatal.
    fn preflight(&self) -> impl Future<Output = Result<(), ExecError>> + Send {
        std::future::ready(Ok(()))
    }

    fn prepare(&self, seq: u64) -> Self::Request;

    fn execute(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Completed, ExecError>> + Send;
}
