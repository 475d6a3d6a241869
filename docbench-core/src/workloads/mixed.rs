use std::sync::{Arc, Mutex};
use std::time::Duration;

use docbench_value::{DateTimeMillis, DocId, Document, ID_FIELD};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::executor::{ExecError, Executor, Target, WriteCounts, WriteModel};
use crate::runner::{Completed, Error, Harness, Operation, Result, RunSummary, duration_ms};

pub const DEFAULT_INSERTS: u64 = 100;
pub const DEFAULT_UPDATES: u64 = 50;
pub const DEFAULT_DELETES: u64 = 10;

pub fn default_targets() -> Vec<Target> {
    vec![
        Target::new("blog_main", "articles"),
        Target::new("blog_meta", "tags"),
        Target::new("blog_audit", "history"),
    ]
}

#[derive(Debug, Clone)]
pub struct MixedOptions {
    pub targets: Vec<Target>,
    pub inserts: u64,
    /// Updates touch the first `updates` inserted keys.
    pub updates: u64,
    /// Deletes remove the last `deletes` inserted keys.
    pub deletes: u64,
}

impl Default for MixedOptions {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            inserts: DEFAULT_INSERTS,
            updates: DEFAULT_UPDATES,
            deletes: DEFAULT_DELETES,
        }
    }
}

impl MixedOptions {
    pub fn validate(&self) -> Result<()> {
        if self.updates > self.inserts {
            return Err(Error::InvalidConfig(format!(
                "`updates` ({}) cannot exceed `inserts` ({})",
                self.updates, self.inserts
            )));
        }
        if self.deletes > self.inserts {
            return Err(Error::InvalidConfig(format!(
                "`deletes` ({}) cannot exceed `inserts` ({})",
                self.deletes, self.inserts
            )));
        }
        Ok(())
    }
}

fn doc_id(database: &str, j: u64) -> DocId {
    DocId::from(format!("doc-{database}-{j}"))
}

/// The unordered bulk write issued against one database: inserts, then updates of the
/// first keys, then deletes of the last keys in reverse order.
pub fn mixed_models(database: &str, options: &MixedOptions) -> Vec<WriteModel> {
    let now = DateTimeMillis::now();
    let mut models =
        Vec::with_capacity((options.inserts + options.updates + options.deletes) as usize);

    for j in 0..options.inserts {
        models.push(WriteModel::InsertOne(
            Document::with_capacity(4)
                .with(ID_FIELD, doc_id(database, j))
                .with("title", format!("Article {j} for {database}"))
                .with("status", "draft")
                .with("timestamp", now),
        ));
    }
    for j in 0..options.updates {
        models.push(WriteModel::UpdateOne {
            id: doc_id(database, j),
            set: Document::with_capacity(2)
                .with("status", "published")
                .with("updated_at", now),
        });
    }
    for j in 0..options.deletes.min(options.inserts) {
        models.push(WriteModel::DeleteOne {
            id: doc_id(database, options.inserts - 1 - j),
        });
    }
    models
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: Target,
    pub requested: WriteCounts,
    pub applied: WriteCounts,
    #[serde(rename = "duration_ms", serialize_with = "duration_ms")]
    pub duration: Duration,
}

pub struct MixedRequest {
    seq: u64,
    /// `None` when the run outlasts the target list.
    target: Option<Target>,
    models: Vec<WriteModel>,
}

/// One iteration per target: clear it, then apply the mixed bulk write.
pub struct MixedWrite<E> {
    executor: Arc<E>,
    options: MixedOptions,
    reports: Mutex<Vec<(u64, TargetReport)>>,
}

impl<E: Executor> MixedWrite<E> {
    pub fn new(executor: Arc<E>, options: MixedOptions) -> Self {
        Self {
            executor,
            options,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Per-target reports of successful iterations, in target order.
    pub fn reports(&self) -> Vec<TargetReport> {
        let mut reports = self
            .reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        reports.sort_by_key(|(seq, _)| *seq);
        reports.into_iter().map(|(_, r)| r).collect()
    }
}

impl<E: Executor> Operation for MixedWrite<E> {
    type Request = MixedRequest;

    fn name(&self) -> &str {
        "mixed_bulk_write"
    }

    async fn preflight(&self) -> std::result::Result<(), ExecError> {
        self.executor.ping().await
    }

    fn prepare(&self, seq: u64) -> MixedRequest {
        let target = usize::try_from(seq)
            .ok()
            .and_then(|i| self.options.targets.get(i))
            .cloned();
        let models = target
            .as_ref()
            .map(|t| mixed_models(t.database(), &self.options))
            .unwrap_or_default();
        MixedRequest {
            seq,
            target,
            models,
        }
    }

    async fn execute(&self, request: MixedRequest) -> std::result::Result<Completed, ExecError> {
        let MixedRequest {
            seq,
            target,
            models,
        } = request;
        let target = target.ok_or_else(|| {
            ExecError::permanent(format!(
                "iteration {seq} has no target ({} configured)",
                self.options.targets.len()
            ))
        })?;
        let started = Instant::now();

        let cleared = self.executor.clear(&target).await?;
        debug!(collection = %target, cleared, "cleared target");

        let requested = WriteCounts::of(&models);
        let reported = self.executor.bulk_write(&target, models).await?;
        let applied = reported.clamped_to(&requested);
        if applied != reported {
            warn!(
                collection = %target,
                ?reported,
                ?requested,
                "executor reported more writes than requested; clamped"
            );
        }
        info!(
            collection = %target,
            inserted = applied.inserted,
            updated = applied.updated,
            deleted = applied.deleted,
            "bulk write applied"
        );

        let report = TargetReport {
            target,
            requested,
            applied,
            duration: started.elapsed(),
        };
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((seq, report));

        Ok(Completed::applied(applied))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MixedReport {
    pub summary: RunSummary,
    pub targets: Vec<TargetReport>,
    /// Applied writes across all targets.
    pub total: WriteCounts,
    /// Document count of the first target once every target has been processed.
    pub final_count: Option<u64>,
}

pub async fn mixed<E: Executor>(
    harness: &Harness,
    executor: Arc<E>,
    options: MixedOptions,
) -> Result<MixedReport> {
    options.validate()?;

    let first = options.targets.first().cloned();
    let iterations = options.targets.len() as u64;
    let op = Arc::new(MixedWrite::new(executor.clone(), options));
    let summary = harness.with_iterations(iterations).run(op.clone()).await?;

    let final_count = match first {
        Some(target) if iterations > 0 => {
            Some(executor.count(&target).await.map_err(Error::Executor)?)
        }
        _ => None,
    };

    Ok(MixedReport {
        total: summary.applied,
        targets: op.reports(),
        summary,
        final_count,
    })
}
