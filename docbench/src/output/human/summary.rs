use std::fmt::Write as _;

use docbench_core::runner::RunSummary;
use docbench_core::workloads::{LookupReport, MixedReport, SeedReport};
use docbench_value::Value;

use super::format::{format_duration, format_ms, format_rate};

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();
    render_into(summary, &mut out);
    out
}

fn render_into(s: &RunSummary, out: &mut String) {
    writeln!(out, "operation: {}", s.operation).ok();
    writeln!(
        out,
        "  operations: {} (ok {}, failed {}: transient {} permanent {} unknown {})",
        s.issued,
        s.successes,
        s.failures.total(),
        s.failures.transient,
        s.failures.permanent,
        s.failures.unknown
    )
    .ok();
    if s.failures.total() > 0 {
        writeln!(out, "  time in failed operations: {}", format_ms(s.failed_time)).ok();
    }
    if s.anomalies > 0 {
        writeln!(out, "  anomalies: {}", s.anomalies).ok();
    }
    if s.applied.total() > 0 {
        writeln!(
            out,
            "  applied: inserted {} updated {} deleted {}",
            s.applied.inserted, s.applied.updated, s.applied.deleted
        )
        .ok();
    }
    writeln!(
        out,
        "  elapsed: {} throughput: {}/s",
        format_ms(s.elapsed),
        format_rate(s.throughput)
    )
    .ok();

    match &s.latency {
        Some(l) => {
            writeln!(
                out,
                "  latency = p50={} p90={} p95={} p99={} mean={} min={} max={}",
                format_duration(l.p50),
                format_duration(l.p90),
                format_duration(l.p95),
                format_duration(l.p99),
                format_ms(l.mean),
                format_duration(l.min),
                format_duration(l.max)
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }
}

pub(crate) fn render_seed(r: &SeedReport) -> String {
    let mut out = String::new();
    render_into(&r.summary, &mut out);
    writeln!(
        out,
        "  records: inserted {} of {} into {} in {} batches",
        r.records_inserted, r.records_requested, r.target, r.batches
    )
    .ok();
    writeln!(out, "  insert rate: {} docs/sec", format_rate(r.insert_rate)).ok();
    out
}

pub(crate) fn render_mixed(r: &MixedReport) -> String {
    let mut out = String::new();
    for t in &r.targets {
        writeln!(
            out,
            "{}: inserted {} updated {} deleted {} ({})",
            t.target,
            t.applied.inserted,
            t.applied.updated,
            t.applied.deleted,
            format_ms(t.duration)
        )
        .ok();
    }
    out.push('\n');
    render_into(&r.summary, &mut out);
    writeln!(out, "  total time: {}", format_ms(r.summary.elapsed)).ok();
    if let (Some(count), Some(first)) = (r.final_count, r.targets.first()) {
        writeln!(out, "  documents in {}: {count}", first.target).ok();
    }
    out
}

pub(crate) fn render_lookup(r: &LookupReport) -> String {
    let mut out = String::new();
    out.push_str(&render_seed(&r.seed));
    out.push('\n');
    render_into(&r.lookups, &mut out);
    writeln!(out, "  total lookup time: {}", format_ms(r.total_lookup_time)).ok();
    writeln!(
        out,
        "  mean lookup latency: {:.3} ms",
        r.mean_latency.as_secs_f64() * 1000.0
    )
    .ok();
    writeln!(out, "  lookup throughput: {} lookups/sec", format_rate(r.throughput)).ok();

    if let (Some(id), Some(doc)) = (&r.verified_id, &r.verified) {
        writeln!(out, "verified: {id}").ok();
        for key in ["title", "createdAt"] {
            let value = match doc.get(key) {
                Some(Value::String(s)) => s.to_string(),
                Some(Value::DateTime(ms)) => ms.0.to_string(),
                Some(other) => format!("{other:?}"),
                None => "-".to_string(),
            };
            writeln!(out, "  {key}: {value}").ok();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docbench_core::WriteCounts;

    use super::*;

    #[test]
    fn summary_without_successes_has_no_latency() {
        let mut s = RunSummary::empty("insert_flood");
        s.issued = 2;
        s.failures.transient = 2;
        s.elapsed = Duration::from_millis(200);

        let out = render(&s);
        assert!(out.contains("operation: insert_flood"), "{out}");
        assert!(out.contains("failed 2: transient 2"), "{out}");
        assert!(out.contains("latency: n/a"), "{out}");
        assert!(!out.contains("applied"), "{out}");
    }

    #[test]
    fn applied_counts_are_listed_when_present() {
        let mut s = RunSummary::empty("mixed_bulk_write");
        s.applied = WriteCounts {
            inserted: 100,
            updated: 50,
            deleted: 10,
        };
        let out = render(&s);
        assert!(out.contains("inserted 100 updated 50 deleted 10"), "{out}");
    }
}
