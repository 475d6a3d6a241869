use std::net::IpAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use docbench_core::Target;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_target(input: &str) -> Result<Target, String> {
    input.parse()
}

fn parse_positive_f64(input: &str) -> Result<f64, String> {
    match input.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(format!("expected a positive number, got '{input}'")),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "docbench",
    author,
    version,
    about = "Load and benchmark runs against a document database",
    long_about = "docbench issues repeatable load against a document database: a continuous insert flood, a bulk seeder, a mixed bulk-write benchmark and a point-lookup benchmark. It can also serve a small live metrics dashboard.\n\nUse `--uri memory://` to run against the built-in in-memory store.",
    after_help = "Examples:\n  docbench flood --cache-size-gb 0.25\n  docbench seed --records 100000 --batch-size 5000\n  docbench mixed --output json\n  docbench lookup --records 100000 --lookups 10000\n  docbench --uri memory:// lookup --records 1000 --lookups 100\n  DASHBOARD_PORT=8080 docbench dashboard"
)]
pub struct Cli {
    /// Connection string of the database under test (`memory://` for the in-process store)
    #[arg(
        long,
        global = true,
        env = "MONGO_URI",
        default_value = "mongodb://localhost:27017"
    )]
    pub uri: String,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Continuously insert documents until interrupted (Ctrl-C)
    #[command(
        long_about = "Insert single documents as fast as the server accepts them, to put write pressure on the storage engine.\n\nRuns until Ctrl-C unless --iterations is given. Failed inserts are counted and followed by a short backoff."
    )]
    Flood(FloodArgs),

    /// Bulk-insert generated records in fixed-size batches
    Seed(SeedArgs),

    /// Clear targets, then apply one unordered insert/update/delete bulk write to each
    Mixed(MixedArgs),

    /// Seed UUIDv7-keyed records, then time random point lookups
    Lookup(LookupArgs),

    /// Serve a live server-metrics dashboard over HTTP
    Dashboard(DashboardArgs),
}

#[derive(Debug, Clone, Args)]
pub struct HarnessArgs {
    /// Operations allowed in flight at once
    #[arg(long, default_value_t = 1)]
    pub concurrency: u64,

    /// Delay after a transient failure (e.g. 100ms, 1s)
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    pub error_backoff: Duration,

    /// Report a progress milestone every N completed operations
    #[arg(long, default_value_t = 1000)]
    pub progress_every: u64,

    /// Per-operation deadline; expiry counts as a transient failure
    #[arg(long, value_parser = parse_duration)]
    pub op_timeout: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct FloodArgs {
    /// Storage-engine cache size (GB) of the server under test; recorded with the run
    #[arg(long, value_parser = parse_positive_f64)]
    pub cache_size_gb: f64,

    /// Target as <database>.<collection>
    #[arg(long, value_parser = parse_target, default_value = "admission_test_db.requests")]
    pub target: Target,

    /// Stop after this many inserts instead of running until interrupted
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Times the per-request payload fragment is repeated
    #[arg(long, default_value_t = 100)]
    pub payload_repeat: usize,

    /// Interval between summary snapshots while running
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub snapshot_every: Duration,

    #[command(flatten)]
    pub harness: HarnessArgs,
}

#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Target as <database>.<collection>
    #[arg(long, value_parser = parse_target, default_value = "testdb.items")]
    pub target: Target,

    /// Total records to insert
    #[arg(long, default_value_t = 500_000)]
    pub records: u64,

    /// Records per insert batch
    #[arg(long, default_value_t = 10_000)]
    pub batch_size: u64,

    /// Extra tag added to every generated item
    #[arg(long, default_value = "seed_test")]
    pub tag: String,

    #[command(flatten)]
    pub harness: HarnessArgs,
}

#[derive(Debug, Args)]
pub struct MixedArgs {
    /// Targets as <database>.<collection> (repeatable)
    #[arg(
        long = "target",
        value_parser = parse_target,
        default_values = ["blog_main.articles", "blog_meta.tags", "blog_audit.history"]
    )]
    pub targets: Vec<Target>,

    /// Inserts per target
    #[arg(long, default_value_t = 100)]
    pub inserts: u64,

    /// Updates per target (applied to the first inserted keys)
    #[arg(long, default_value_t = 50)]
    pub updates: u64,

    /// Deletes per target (applied to the last inserted keys)
    #[arg(long, default_value_t = 10)]
    pub deletes: u64,

    #[command(flatten)]
    pub harness: HarnessArgs,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Target as <database>.<collection>
    #[arg(long, value_parser = parse_target, default_value = "idhackDB.contentItems")]
    pub target: Target,

    /// Records to seed
    #[arg(long, default_value_t = 100_000)]
    pub records: u64,

    /// Random point lookups to perform
    #[arg(long, default_value_t = 10_000)]
    pub lookups: u64,

    /// Seed batch size (defaults to a single batch of all records)
    #[arg(long)]
    pub seed_batch: Option<u64>,

    /// Keep the existing collection instead of dropping it first
    #[arg(long)]
    pub keep_existing: bool,

    /// Seed for the lookup id picker, for reproducible access patterns
    #[arg(long)]
    pub rng_seed: Option<u64>,

    #[command(flatten)]
    pub harness: HarnessArgs,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    /// Bind address (loopback only)
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Listen port (0 picks a free port)
    #[arg(long, env = "DASHBOARD_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Metrics polling interval
    #[arg(long, value_parser = parse_duration, default_value = "3s")]
    pub interval: Duration,

    /// Collection whose document count is shown, as <database>.<collection>
    #[arg(long, value_parser = parse_target, default_value = "idhackDB.contentItems")]
    pub target: Target,
}
