use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use docbench_core::poller::{ExecutorStatus, MetricsPoller};
use docbench_core::runner::{Harness, RunConfig};
use docbench_core::workloads::{
    self, FloodOptions, InsertFlood, ItemGenerator, LookupOptions, MixedOptions, SeedOptions,
};
use tracing::info;

use crate::cli::{
    DashboardArgs, FloodArgs, HarnessArgs, LookupArgs, MixedArgs, OutputFormat, SeedArgs,
};
use crate::executor::AnyExecutor;
use crate::output::{self, OutputFormatter};
use crate::run_error::RunError;
use crate::web::DashboardServer;

pub async fn flood(args: FloodArgs, uri: &str, format: OutputFormat) -> Result<(), RunError> {
    let out = output::formatter(format);
    let executor = connect(uri).await?;

    let mut fields = vec![
        ("executor", executor.kind().to_string()),
        ("target", args.target.to_string()),
        ("cache_size_gb", args.cache_size_gb.to_string()),
        ("concurrency", args.harness.concurrency.to_string()),
    ];
    if let Some(n) = args.iterations {
        fields.push(("iterations", n.to_string()));
    }
    out.print_header("flood", &fields);
    info!(
        target_collection = %args.target,
        cache_size_gb = args.cache_size_gb,
        iterations = ?args.iterations,
        "starting insert flood"
    );

    let mut cfg = run_config(&args.harness);
    cfg.iterations = args.iterations;
    cfg.snapshot_every = args.snapshot_every;
    let harness = harness(cfg, out.as_ref());

    let stop = harness.stop_signal();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; draining in-flight operations");
            stop.stop();
        }
    });

    let op = Arc::new(InsertFlood::new(
        executor,
        FloodOptions {
            target: args.target,
            payload_repeat: args.payload_repeat,
        },
    ));
    let res = harness.run_continuous(op, out.snapshot()).await;
    ctrl_c.abort();

    let summary = res?;
    out.print_summary(&summary).map_err(RunError::RuntimeError)
}

pub async fn seed(args: SeedArgs, uri: &str, format: OutputFormat) -> Result<(), RunError> {
    let out = output::formatter(format);
    let executor = connect(uri).await?;

    out.print_header(
        "seed",
        &[
            ("executor", executor.kind().to_string()),
            ("target", args.target.to_string()),
            ("records", args.records.to_string()),
            ("batch_size", args.batch_size.to_string()),
        ],
    );

    let harness = harness(run_config(&args.harness), out.as_ref());
    let options = SeedOptions {
        target: args.target,
        records: args.records,
        batch_size: args.batch_size,
    };
    let report = workloads::seed(&harness, executor, &options, ItemGenerator::new(&args.tag)).await?;
    out.print_seed(&report).map_err(RunError::RuntimeError)
}

pub async fn mixed(args: MixedArgs, uri: &str, format: OutputFormat) -> Result<(), RunError> {
    let out = output::formatter(format);
    let executor = connect(uri).await?;

    let targets = args
        .targets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    out.print_header(
        "mixed",
        &[
            ("executor", executor.kind().to_string()),
            ("targets", targets),
            ("inserts", args.inserts.to_string()),
            ("updates", args.updates.to_string()),
            ("deletes", args.deletes.to_string()),
        ],
    );

    let harness = harness(run_config(&args.harness), out.as_ref());
    let options = MixedOptions {
        targets: args.targets,
        inserts: args.inserts,
        updates: args.updates,
        deletes: args.deletes,
    };
    let report = workloads::mixed(&harness, executor, options).await?;
    out.print_mixed(&report).map_err(RunError::RuntimeError)
}

pub async fn lookup(args: LookupArgs, uri: &str, format: OutputFormat) -> Result<(), RunError> {
    let out = output::formatter(format);
    let executor = connect(uri).await?;

    out.print_header(
        "lookup",
        &[
            ("executor", executor.kind().to_string()),
            ("target", args.target.to_string()),
            ("records", args.records.to_string()),
            ("lookups", args.lookups.to_string()),
        ],
    );

    let harness = harness(run_config(&args.harness), out.as_ref());
    let options = LookupOptions {
        target: args.target,
        records: args.records,
        lookups: args.lookups,
        seed_batch: args.seed_batch,
        drop_first: !args.keep_existing,
        rng_seed: args.rng_seed,
    };
    let report = workloads::lookup(&harness, executor, &options).await?;
    out.print_lookup(&report).map_err(RunError::RuntimeError)
}

pub async fn dashboard(args: DashboardArgs, uri: &str) -> Result<(), RunError> {
    let bind_addr = SocketAddr::new(args.bind, args.port);
    if !bind_addr.ip().is_loopback() {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "--bind must be a loopback address (got {bind_addr}); remote binding is not supported"
        )));
    }

    let executor = connect(uri).await?;
    let poller = MetricsPoller::start(
        ExecutorStatus::new(executor, args.target.clone()),
        args.interval,
    )
    .await;

    let server = match DashboardServer::start(bind_addr, poller.reader()).await {
        Ok(v) => v,
        Err(err) => {
            poller.shutdown().await;
            return Err(RunError::RuntimeError(err));
        }
    };
    eprintln!("dashboard={}", server.url());
    info!(
        url = %server.url(),
        watched = %args.target,
        interval = ?args.interval,
        "dashboard listening"
    );

    let waited = tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c");

    server.shutdown().await;
    poller.shutdown().await;
    info!("dashboard stopped");

    waited.map_err(RunError::RuntimeError)
}

async fn connect(uri: &str) -> Result<Arc<AnyExecutor>, RunError> {
    let executor = AnyExecutor::connect(uri).await?;
    Ok(Arc::new(executor))
}

fn run_config(args: &HarnessArgs) -> RunConfig {
    RunConfig {
        concurrency: args.concurrency,
        error_backoff: args.error_backoff,
        progress_every: args.progress_every,
        op_timeout: args.op_timeout,
        ..RunConfig::default()
    }
}

fn harness(cfg: RunConfig, out: &dyn OutputFormatter) -> Harness {
    let harness = Harness::new(cfg);
    match out.progress() {
        Some(progress) => harness.with_progress(progress),
        None => harness,
    }
}
