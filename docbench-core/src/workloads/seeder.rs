use std::ops::Range;
use std::sync::Arc;

use docbench_value::{DateTimeMillis, Document, ID_FIELD, Value};
use serde::Serialize;
use tracing::info;

use crate::executor::{ExecError, Executor, Target, WriteCounts};
use crate::runner::{Completed, Error, Harness, Operation, Result, RunSummary};

pub const DEFAULT_DATABASE: &str = "testdb";
pub const DEFAULT_COLLECTION: &str = "items";
pub const DEFAULT_RECORDS: u64 = 500_000;
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;

/// Number of flushes needed for `total` records in batches of `batch_size`.
///
/// `batch_size` must be positive.
pub fn batch_count(total: u64, batch_size: u64) -> u64 {
    total.div_ceil(batch_size)
}

/// Record indices covered by batch `seq`.
pub fn batch_range(seq: u64, total: u64, batch_size: u64) -> Range<u64> {
    let start = seq.saturating_mul(batch_size).min(total);
    let end = start.saturating_add(batch_size).min(total);
    start..end
}

/// The exact flush plan for `total` records.
pub fn batch_ranges(total: u64, batch_size: u64) -> Result<Vec<Range<u64>>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig(
            "`batch_size` must be a positive integer".to_string(),
        ));
    }
    Ok((0..batch_count(total, batch_size))
        .map(|seq| batch_range(seq, total, batch_size))
        .collect())
}

/// Produces the document for record `index`.
pub trait RecordGenerator: Send + Sync + 'static {
    fn generate(&self, index: u64) -> Document;
}

impl<F> RecordGenerator for F
where
    F: Fn(u64) -> Document + Send + Sync + 'static,
{
    fn generate(&self, index: u64) -> Document {
        self(index)
    }
}

/// Generic catalogue items keyed by their integer index.
#[derive(Debug, Clone)]
pub struct ItemGenerator {
    tag: Arc<str>,
}

impl ItemGenerator {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: Arc::from(tag),
        }
    }
}

impl Default for ItemGenerator {
    fn default() -> Self {
        Self::new("seed_test")
    }
}

impl RecordGenerator for ItemGenerator {
    fn generate(&self, index: u64) -> Document {
        let now = DateTimeMillis::now();
        Document::with_capacity(5)
            .with(ID_FIELD, index as i64)
            .with("name", format!("Item_{index}_{}", now.0))
            .with("value", rand::random::<f64>() * 1000.0)
            .with(
                "tags",
                vec![
                    Value::from(format!("tag{}", index % 10)),
                    Value::from("common_tag"),
                    Value::String(self.tag.clone()),
                ],
            )
            .with("timestamp", now)
    }
}

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub target: Target,
    pub records: u64,
    pub batch_size: u64,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            target: Target::new(DEFAULT_DATABASE, DEFAULT_COLLECTION),
            records: DEFAULT_RECORDS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// One harness iteration per batch; each iteration is a single `insert_many`.
pub struct BulkSeeder<E, G> {
    executor: Arc<E>,
    target: Target,
    total: u64,
    batch_size: u64,
    generator: G,
}

impl<E: Executor, G: RecordGenerator> BulkSeeder<E, G> {
    pub fn new(executor: Arc<E>, options: &SeedOptions, generator: G) -> Self {
        Self {
            executor,
            target: options.target.clone(),
            total: options.records,
            batch_size: options.batch_size,
            generator,
        }
    }

    pub fn batches(&self) -> u64 {
        batch_count(self.total, self.batch_size)
    }
}

impl<E: Executor, G: RecordGenerator> Operation for BulkSeeder<E, G> {
    type Request = (Range<u64>, Vec<Document>);

    fn name(&self) -> &str {
        "bulk_seed"
    }

    async fn preflight(&self) -> std::result::Result<(), ExecError> {
        self.executor.ping().await
    }

    fn prepare(&self, seq: u64) -> Self::Request {
        let range = batch_range(seq, self.total, self.batch_size);
        let docs = range.clone().map(|i| self.generator.generate(i)).collect();
        (range, docs)
    }

    async fn execute(
        &self,
        (range, docs): Self::Request,
    ) -> std::result::Result<Completed, ExecError> {
        let requested = docs.len() as u64;
        let inserted = match self.executor.insert_many(&self.target, docs).await {
            Ok(n) => n,
            Err(err) => {
                // Keep whatever the batch wrote before failing.
                let partial = err.applied.inserted.min(requested);
                return Err(err.with_applied(WriteCounts::inserted(partial)));
            }
        };
        info!(
            collection = %self.target,
            inserted,
            through = range.end,
            "inserted batch"
        );

        let mut completed = Completed::applied(WriteCounts::inserted(inserted.min(requested)));
        if inserted != requested {
            completed.anomaly = Some(format!(
                "batch {}..{} inserted {inserted} of {requested} records",
                range.start, range.end
            ));
        }
        Ok(completed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub target: Target,
    pub summary: RunSummary,
    pub records_requested: u64,
    pub records_inserted: u64,
    pub batches: u64,
    /// Inserted records per second of seeding wall time.
    pub insert_rate: f64,
}

/// Seeds `options.records` documents in batches of `options.batch_size`.
///
/// The harness' iteration count is replaced by the batch count.
pub async fn seed<E, G>(
    harness: &Harness,
    executor: Arc<E>,
    options: &SeedOptions,
    generator: G,
) -> Result<SeedReport>
where
    E: Executor,
    G: RecordGenerator,
{
    if options.batch_size == 0 {
        return Err(Error::InvalidConfig(
            "`batch_size` must be a positive integer".to_string(),
        ));
    }

    let op = Arc::new(BulkSeeder::new(executor, options, generator));
    let batches = op.batches();
    let summary = harness.with_iterations(batches).run(op).await?;

    let records_inserted = summary.applied.inserted;
    let secs = summary.elapsed.as_secs_f64();
    let insert_rate = if secs > 0.0 {
        records_inserted as f64 / secs
    } else {
        0.0
    };

    Ok(SeedReport {
        target: options.target.clone(),
        summary,
        records_requested: options.records,
        records_inserted,
        batches,
        insert_rate,
    })
}
