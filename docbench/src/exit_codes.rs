#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The executor could not be reached before the run started.
    ExecutorUnavailable = 20,

    /// The post-run consistency check did not find the expected document.
    VerificationFailed = 21,

    /// Invalid CLI/config/options (bad flags, invalid durations, missing required values, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, failed executor calls outside the timed run, panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
