mod executor;

pub mod poller;
pub mod runner;
pub mod workloads;

pub use executor::{
    Connections, ExecError, ExecResult, Executor, OpCounters, ServerStatus, Target, WriteCounts,
    WriteModel,
};
pub use runner::{Error, FailureKind, Result};
