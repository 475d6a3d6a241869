use docbench_core::runner::{ProgressFn, RunSummary, SnapshotFn};
use docbench_core::workloads::{LookupReport, MixedReport, SeedReport};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, command: &str, fields: &[(&str, String)]);
    fn progress(&self) -> Option<ProgressFn>;
    fn snapshot(&self) -> SnapshotFn;
    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()>;
    fn print_seed(&self, report: &SeedReport) -> anyhow::Result<()>;
    fn print_mixed(&self, report: &MixedReport) -> anyhow::Result<()>;
    fn print_lookup(&self, report: &LookupReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
