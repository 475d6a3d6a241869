use docbench_core::FailureKind;
use mongodb::error::{ErrorKind, WriteFailure};

/// Server error codes that signal a condition expected to clear on retry
/// (elections, shutdowns, throttling, exceeded time limits, network timeouts).
pub const TRANSIENT_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    50,    // MaxTimeMSExpired
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    262,   // ExceededTimeLimit
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

/// Codes for rejected input: the same request would fail again.
const PERMANENT_CODES: &[i32] = &[
    2,     // BadValue
    9,     // FailedToParse
    14,    // TypeMismatch
    26,    // NamespaceNotFound
    52,    // DollarPrefixedFieldName
    121,   // DocumentValidationFailure
    10334, // BSONObjectTooLarge
    11000, // DuplicateKey
];

pub fn classify_code(code: i32) -> FailureKind {
    if TRANSIENT_CODES.contains(&code) {
        FailureKind::Transient
    } else if PERMANENT_CODES.contains(&code) {
        FailureKind::Permanent
    } else {
        FailureKind::Unknown
    }
}

pub fn classify(err: &mongodb::error::Error) -> FailureKind {
    if err.contains_label("RetryableWriteError") || err.contains_label("TransientTransactionError")
    {
        return FailureKind::Transient;
    }

    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => FailureKind::Transient,
        ErrorKind::Command(cmd) => classify_code(cmd.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => match classify_code(write.code) {
            FailureKind::Transient => FailureKind::Transient,
            _ => FailureKind::Permanent,
        },
        ErrorKind::Write(WriteFailure::WriteConcernError(wc)) => classify_code(wc.code),
        ErrorKind::InsertMany(_)
        | ErrorKind::InvalidArgument { .. }
        | ErrorKind::Authentication { .. } => FailureKind::Permanent,
        _ => FailureKind::Unknown,
    }
}
