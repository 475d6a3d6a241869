use std::io::Write as _;
use std::sync::Arc;

use docbench_core::runner::{ProgressFn, ProgressUpdate, RunSummary, SnapshotFn};
use docbench_core::workloads::{LookupReport, MixedReport, SeedReport};
use serde::Serialize;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

#[derive(Debug, Serialize)]
struct ProgressLine<'a> {
    kind: &'static str,
    operation: &'a str,
    completed: u64,
    successes: u64,
    failures: u64,
}

#[derive(Debug, Serialize)]
struct ReportLine<'a, T: Serialize> {
    kind: &'static str,
    #[serde(flatten)]
    report: &'a T,
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _command: &str, _fields: &[(&str, String)]) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(|u: ProgressUpdate| {
            if u.milestone.is_none() {
                return;
            }
            emit_json_line(&ProgressLine {
                kind: "progress",
                operation: &u.operation,
                completed: u.counts.completed,
                successes: u.counts.successes,
                failures: u.counts.failures,
            });
        }))
    }

    fn snapshot(&self) -> SnapshotFn {
        Arc::new(|summary: RunSummary| {
            emit_json_line(&ReportLine {
                kind: "snapshot",
                report: &summary,
            });
        })
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        emit_json_line(&ReportLine {
            kind: "summary",
            report: summary,
        });
        Ok(())
    }

    fn print_seed(&self, report: &SeedReport) -> anyhow::Result<()> {
        emit_json_line(&ReportLine {
            kind: "seed",
            report,
        });
        Ok(())
    }

    fn print_mixed(&self, report: &MixedReport) -> anyhow::Result<()> {
        emit_json_line(&ReportLine {
            kind: "mixed",
            report,
        });
        Ok(())
    }

    fn print_lookup(&self, report: &LookupReport) -> anyhow::Result<()> {
        emit_json_line(&ReportLine {
            kind: "lookup",
            report,
        });
        Ok(())
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
