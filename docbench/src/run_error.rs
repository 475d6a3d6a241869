use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    ExecutorUnavailable(anyhow::Error),
    VerificationFailed(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::ExecutorUnavailable(_) => ExitCode::ExecutorUnavailable,
            Self::VerificationFailed(_) => ExitCode::VerificationFailed,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e)
            | Self::ExecutorUnavailable(e)
            | Self::VerificationFailed(e)
            | Self::RuntimeError(e) => e,
        }
    }
}

impl From<docbench_core::Error> for RunError {
    fn from(err: docbench_core::Error) -> Self {
        use docbench_core::Error;

        match err {
            Error::Fatal(_) => Self::ExecutorUnavailable(err.into()),
            Error::InvalidConfig(_) => Self::InvalidInput(err.into()),
            Error::VerificationFailed(_) => Self::VerificationFailed(err.into()),
            Error::Executor(_) | Error::Join(_) => Self::RuntimeError(err.into()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use docbench_core::{Error, ExecError};

    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                Error::Fatal(ExecError::transient("connection refused")),
                ExitCode::ExecutorUnavailable,
            ),
            (
                Error::InvalidConfig("bad".to_string()),
                ExitCode::InvalidInput,
            ),
            (
                Error::VerificationFailed("missing".to_string()),
                ExitCode::VerificationFailed,
            ),
            (
                Error::Executor(ExecError::unknown("boom")),
                ExitCode::RuntimeError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(RunError::from(err).exit_code(), code);
        }
    }

    #[test]
    fn display_includes_cause() {
        let err = RunError::from(Error::InvalidConfig("`batch_size` must be positive".to_string()));
        assert!(err.to_string().contains("batch_size"));
    }
}
