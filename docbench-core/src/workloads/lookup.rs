use std::sync::{Arc, Mutex};
use std::time::Duration;

use docbench_value::{DateTimeMillis, DocId, Document, ID_FIELD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::executor::{ExecError, Executor, Target};
use crate::runner::{Completed, Error, Harness, Operation, Result, RunSummary, duration_ms};

use super::seeder::{RecordGenerator, SeedOptions, SeedReport, seed};

pub const DEFAULT_DATABASE: &str = "idhackDB";
pub const DEFAULT_COLLECTION: &str = "contentItems";
pub const DEFAULT_RECORDS: u64 = 100_000;
pub const DEFAULT_LOOKUPS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct LookupOptions {
    pub target: Target,
    pub records: u64,
    pub lookups: u64,
    /// Seed batch size; `None` inserts every record in a single batch.
    pub seed_batch: Option<u64>,
    /// Drop the target before seeding.
    pub drop_first: bool,
    /// Fixed seed for the lookup id picker.
    pub rng_seed: Option<u64>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            target: Target::new(DEFAULT_DATABASE, DEFAULT_COLLECTION),
            records: DEFAULT_RECORDS,
            lookups: DEFAULT_LOOKUPS,
            seed_batch: None,
            drop_first: true,
            rng_seed: None,
        }
    }
}

/// Time-ordered UUIDv7 keys, generated client side.
pub fn generate_ids(n: u64) -> Arc<[Arc<str>]> {
    (0..n)
        .map(|_| Arc::from(uuid::Uuid::now_v7().to_string()))
        .collect()
}

/// Content items keyed by pre-generated ids.
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    ids: Arc<[Arc<str>]>,
}

impl ContentGenerator {
    pub fn new(ids: Arc<[Arc<str>]>) -> Self {
        Self { ids }
    }
}

impl RecordGenerator for ContentGenerator {
    /// Indices past the pre-generated ids get a fresh key.
    fn generate(&self, index: u64) -> Document {
        let id: Arc<str> = usize::try_from(index)
            .ok()
            .and_then(|i| self.ids.get(i))
            .cloned()
            .unwrap_or_else(|| Arc::from(uuid::Uuid::now_v7().to_string()));
        let short = id.get(..8).unwrap_or(&*id);
        Document::with_capacity(4)
            .with(ID_FIELD, DocId::String(id.clone()))
            .with("title", format!("Content Item {index} - {short}"))
            .with(
                "content",
                format!("This is the content for item number {index}. It's quite interesting!"),
            )
            .with("createdAt", DateTimeMillis::now())
    }
}

/// Fetches one uniformly chosen id (with replacement) per iteration.
pub struct PointLookup<E> {
    executor: Arc<E>,
    target: Target,
    ids: Arc<[Arc<str>]>,
    rng: Mutex<StdRng>,
}

impl<E: Executor> PointLookup<E> {
    pub fn new(
        executor: Arc<E>,
        target: Target,
        ids: Arc<[Arc<str>]>,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            executor,
            target,
            ids,
            rng: Mutex::new(rng),
        }
    }
}

impl<E: Executor> Operation for PointLookup<E> {
    type Request = DocId;

    fn name(&self) -> &str {
        "point_lookup"
    }

    async fn preflight(&self) -> std::result::Result<(), ExecError> {
        if self.ids.is_empty() {
            return Err(ExecError::permanent("no ids to look up"));
        }
        Ok(())
    }

    fn prepare(&self, _seq: u64) -> DocId {
        let index = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen_range(0..self.ids.len());
        DocId::String(self.ids[index].clone())
    }

    async fn execute(&self, id: DocId) -> std::result::Result<Completed, ExecError> {
        match self.executor.find_by_id(&self.target, &id).await? {
            Some(_) => Ok(Completed::default()),
            None => Ok(Completed::anomaly(format!("document with id {id} not found"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    pub seed: SeedReport,
    pub lookups: RunSummary,
    /// Sum of the individual lookup durations, failed lookups included.
    #[serde(rename = "total_lookup_time_ms", serialize_with = "duration_ms")]
    pub total_lookup_time: Duration,
    /// `total_lookup_time` divided by the number of lookups issued.
    #[serde(rename = "mean_latency_ms", serialize_with = "duration_ms")]
    pub mean_latency: Duration,
    /// Lookups issued per second of `total_lookup_time`.
    pub throughput: f64,
    pub verified_id: Option<String>,
    pub verified: Option<Document>,
}

/// Seeds `records` UUIDv7-keyed items, performs `lookups` random point reads, then
/// fetches the middle id as a consistency check.
pub async fn lookup<E: Executor>(
    harness: &Harness,
    executor: Arc<E>,
    options: &LookupOptions,
) -> Result<LookupReport> {
    if options.records == 0 && options.lookups > 0 {
        return Err(Error::InvalidConfig(
            "`lookups` requires at least one seeded record".to_string(),
        ));
    }

    if options.drop_first {
        executor.ping().await.map_err(Error::Fatal)?;
        executor
            .drop_target(&options.target)
            .await
            .map_err(Error::Executor)?;
        info!(collection = %options.target, "dropped target");
    }

    let ids = generate_ids(options.records);
    let seed_options = SeedOptions {
        target: options.target.clone(),
        records: options.records,
        batch_size: options.seed_batch.unwrap_or(options.records.max(1)),
    };
    let seed_report = seed(
        harness,
        executor.clone(),
        &seed_options,
        ContentGenerator::new(ids.clone()),
    )
    .await?;
    info!(
        collection = %options.target,
        inserted = seed_report.records_inserted,
        rate = seed_report.insert_rate,
        "seeding finished"
    );

    let op = Arc::new(PointLookup::new(
        executor.clone(),
        options.target.clone(),
        ids.clone(),
        options.rng_seed,
    ));
    let summary = harness.with_iterations(options.lookups).run(op).await?;

    // Failed lookups took time too; every issued lookup counts.
    let issued = summary.completed();
    let total_lookup_time = summary.busy_time();
    let mean_latency = match issued {
        0 => Duration::ZERO,
        n => Duration::from_nanos((total_lookup_time.as_nanos() / u128::from(n)) as u64),
    };
    let secs = total_lookup_time.as_secs_f64();
    let throughput = if secs > 0.0 {
        issued as f64 / secs
    } else {
        0.0
    };

    let (verified_id, verified) = match ids.get(ids.len() / 2) {
        Some(mid) => {
            let id = DocId::String(mid.clone());
            let doc = executor
                .find_by_id(&options.target, &id)
                .await
                .map_err(Error::Executor)?
                .ok_or_else(|| {
                    Error::VerificationFailed(format!(
                        "document {id} not found in {}",
                        options.target
                    ))
                })?;
            (Some(id.to_string()), Some(doc))
        }
        None => (None, None),
    };

    Ok(LookupReport {
        seed: seed_report,
        lookups: summary,
        total_lookup_time,
        mean_latency,
        throughput,
        verified_id,
        verified,
    })
}
