use std::sync::Arc;

use docbench_core::runner::{ProgressFn, ProgressUpdate, RunSummary, SnapshotFn};
use docbench_core::workloads::{LookupReport, MixedReport, SeedReport};

mod format;
mod progress;
mod summary;

use format::{format_ms, format_rate};
use progress::HumanProgress;
use summary::{render, render_lookup, render_mixed, render_seed};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, command: &str, fields: &[(&str, String)]) {
        let fields = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{command}: {fields}");
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u: ProgressUpdate| progress.update(&u)))
    }

    fn snapshot(&self) -> SnapshotFn {
        let progress = self.progress.clone();
        Arc::new(move |s: RunSummary| {
            let mean = s
                .latency
                .map(|l| format_ms(l.mean))
                .unwrap_or_else(|| "n/a".to_string());
            progress.println(format!(
                "[{}] elapsed={} ok={} failed={} in_flight={} throughput={}/s mean={mean}",
                s.operation,
                format_ms(s.elapsed),
                s.successes,
                s.failures.total(),
                s.in_flight,
                format_rate(s.throughput),
            ));
        })
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        Ok(())
    }

    fn print_seed(&self, report: &SeedReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render_seed(report));
        Ok(())
    }

    fn print_mixed(&self, report: &MixedReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render_mixed(report));
        Ok(())
    }

    fn print_lookup(&self, report: &LookupReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render_lookup(report));
        Ok(())
    }
}
