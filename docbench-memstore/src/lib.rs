//! In-process document store implementing [`Executor`].
//!
//! Backs the `memory://` URI and the workspace tests. Faults and latency can be
//! injected per call kind to exercise the harness' failure handling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use docbench_core::{
    Connections, ExecError, ExecResult, Executor, OpCounters, ServerStatus, Target, WriteCounts,
    WriteModel,
};
use docbench_value::{DocId, Document, ID_FIELD};
use parking_lot::Mutex;
use tracing::debug;

pub const URI_SCHEME: &str = "memory://";

const MAX_CONNECTIONS: u64 = 838_860;

/// Executor entry points, used to address injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Call {
    Ping,
    InsertOne,
    InsertMany,
    BulkWrite,
    FindById,
    Count,
    Clear,
    DropTarget,
    ServerStatus,
}

#[derive(Debug, Default)]
struct Faults {
    calls: AHashMap<Call, u64>,
    /// Fail the n-th (0-based) invocation of a call kind.
    nth: AHashMap<(Call, u64), ExecError>,
    next: AHashMap<Call, VecDeque<ExecError>>,
    latency: AHashMap<Call, Duration>,
    unreachable: bool,
    /// Extra inserts a bulk write claims to have applied.
    over_report: u64,
}

#[derive(Debug, Default)]
struct Counters {
    insert: AtomicU64,
    query: AtomicU64,
    update: AtomicU64,
    delete: AtomicU64,
    command: AtomicU64,
    active: AtomicU64,
}

type Collection = AHashMap<DocId, Document>;

#[derive(Debug, Default)]
pub struct MemStore {
    collections: Mutex<AHashMap<Target, Collection>>,
    faults: Mutex<Faults>,
    counters: Counters,
    next_oid: AtomicU64,
}

struct ActiveGuard<'a>(&'a AtomicU64);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `uri` selects the in-memory store.
    pub fn handles(uri: &str) -> bool {
        uri.trim().starts_with(URI_SCHEME)
    }

    /// Fails the `n`-th (0-based) invocation of `call` with `err`.
    pub fn fail_nth(&self, call: Call, n: u64, err: ExecError) {
        self.faults.lock().nth.insert((call, n), err);
    }

    /// Fails the next invocation of `call` that is not already scripted.
    pub fn fail_next(&self, call: Call, err: ExecError) {
        self.faults
            .lock()
            .next
            .entry(call)
            .or_default()
            .push_back(err);
    }

    pub fn set_latency(&self, call: Call, latency: Duration) {
        self.faults.lock().latency.insert(call, latency);
    }

    /// While set, every call fails as a transient connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.lock().unreachable = unreachable;
    }

    pub fn over_report_bulk_inserts(&self, extra: u64) {
        self.faults.lock().over_report = extra;
    }

    /// Invocations of `call` so far, failed ones included.
    pub fn calls(&self, call: Call) -> u64 {
        self.faults.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn get(&self, target: &Target, id: &DocId) -> Option<Document> {
        self.collections
            .lock()
            .get(target)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Removes a document without touching any counter.
    pub fn remove(&self, target: &Target, id: &DocId) -> Option<Document> {
        self.collections
            .lock()
            .get_mut(target)
            .and_then(|c| c.remove(id))
    }

    pub fn len(&self, target: &Target) -> usize {
        self.collections.lock().get(target).map_or(0, |c| c.len())
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.collections.lock().contains_key(target)
    }

    /// Latency and scripted failure for this invocation, applied in [`MemStore::enter`].
    fn plan(&self, call: Call) -> (Duration, Option<ExecError>) {
        let mut faults = self.faults.lock();
        let n = {
            let counter = faults.calls.entry(call).or_insert(0);
            let n = *counter;
            *counter += 1;
            n
        };
        let latency = faults.latency.get(&call).copied().unwrap_or_default();

        if faults.unreachable {
            return (
                latency,
                Some(ExecError::transient(format!("{call}: connection refused"))),
            );
        }
        let scripted = faults
            .nth
            .remove(&(call, n))
            .or_else(|| faults.next.get_mut(&call).and_then(VecDeque::pop_front));
        (latency, scripted)
    }

    async fn enter(&self, call: Call) -> ExecResult<ActiveGuard<'_>> {
        self.counters.active.fetch_add(1, Ordering::Relaxed);
        let guard = ActiveGuard(&self.counters.active);

        let (latency, scripted) = self.plan(call);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = scripted {
            debug!(%call, error = %err, "injected failure");
            return Err(err);
        }
        Ok(guard)
    }

    /// Returns the document's key, assigning a generated one when it has none.
    fn ensure_id(&self, doc: &mut Document) -> DocId {
        if let Some(id) = doc.id() {
            return id;
        }
        let n = self.next_oid.fetch_add(1, Ordering::Relaxed) + 1;
        let id = DocId::from(format!("{n:024x}"));
        doc.insert(ID_FIELD, id.clone());
        id
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

fn duplicate_key(target: &Target, id: &DocId) -> ExecError {
    ExecError::permanent(format!(
        "E11000 duplicate key error collection: {target} dup key: {{ _id: {id} }}"
    ))
}

impl Executor for MemStore {
    async fn ping(&self) -> ExecResult<()> {
        let _active = self.enter(Call::Ping).await?;
        Self::bump(&self.counters.command, 1);
        Ok(())
    }

    async fn insert_one(&self, target: &Target, mut doc: Document) -> ExecResult<()> {
        let _active = self.enter(Call::InsertOne).await?;
        let id = self.ensure_id(&mut doc);

        let mut collections = self.collections.lock();
        let coll = collections.entry(target.clone()).or_default();
        if coll.contains_key(&id) {
            return Err(duplicate_key(target, &id));
        }
        coll.insert(id, doc);
        Self::bump(&self.counters.insert, 1);
        Ok(())
    }

    /// Ordered: stops at the first duplicate key.
    async fn insert_many(&self, target: &Target, docs: Vec<Document>) -> ExecResult<u64> {
        let _active = self.enter(Call::InsertMany).await?;

        let mut collections = self.collections.lock();
        let coll = collections.entry(target.clone()).or_default();
        let mut inserted = 0;
        let mut result = Ok(());
        for mut doc in docs {
            let id = self.ensure_id(&mut doc);
            if coll.contains_key(&id) {
                result = Err(duplicate_key(target, &id));
                break;
            }
            coll.insert(id, doc);
            inserted += 1;
        }
        Self::bump(&self.counters.insert, inserted);
        result
            .map(|()| inserted)
            .map_err(|err| err.with_applied(WriteCounts::inserted(inserted)))
    }

    /// Unordered: models that cannot be applied are skipped and not counted.
    async fn bulk_write(&self, target: &Target, models: Vec<WriteModel>) -> ExecResult<WriteCounts> {
        let _active = self.enter(Call::BulkWrite).await?;

        let mut applied = WriteCounts::default();
        {
            let mut collections = self.collections.lock();
            let coll = collections.entry(target.clone()).or_default();
            for model in models {
                match model {
                    WriteModel::InsertOne(mut doc) => {
                        let id = self.ensure_id(&mut doc);
                        if !coll.contains_key(&id) {
                            coll.insert(id, doc);
                            applied.inserted += 1;
                        }
                    }
                    WriteModel::UpdateOne { id, set } => {
                        if let Some(doc) = coll.get_mut(&id) {
                            let before = doc.clone();
                            doc.merge(&set);
                            if *doc != before {
                                applied.updated += 1;
                            }
                        }
                    }
                    WriteModel::DeleteOne { id } => {
                        if coll.remove(&id).is_some() {
                            applied.deleted += 1;
                        }
                    }
                }
            }
        }

        Self::bump(&self.counters.insert, applied.inserted);
        Self::bump(&self.counters.update, applied.updated);
        Self::bump(&self.counters.delete, applied.deleted);

        let over_report = self.faults.lock().over_report;
        applied.inserted += over_report;
        Ok(applied)
    }

    async fn find_by_id(&self, target: &Target, id: &DocId) -> ExecResult<Option<Document>> {
        let _active = self.enter(Call::FindById).await?;
        Self::bump(&self.counters.query, 1);
        Ok(self.get(target, id))
    }

    async fn count(&self, target: &Target) -> ExecResult<u64> {
        let _active = self.enter(Call::Count).await?;
        Self::bump(&self.counters.command, 1);
        Ok(self.len(target) as u64)
    }

    async fn clear(&self, target: &Target) -> ExecResult<u64> {
        let _active = self.enter(Call::Clear).await?;
        let removed = self
            .collections
            .lock()
            .get_mut(target)
            .map_or(0, |c| c.drain().count() as u64);
        Self::bump(&self.counters.delete, removed);
        Ok(removed)
    }

    async fn drop_target(&self, target: &Target) -> ExecResult<()> {
        let _active = self.enter(Call::DropTarget).await?;
        self.collections.lock().remove(target);
        Self::bump(&self.counters.command, 1);
        Ok(())
    }

    async fn server_status(&self) -> ExecResult<ServerStatus> {
        let _active = self.enter(Call::ServerStatus).await?;
        Self::bump(&self.counters.command, 1);

        let c = &self.counters;
        let active = c.active.load(Ordering::Relaxed);
        Ok(ServerStatus {
            opcounters: OpCounters {
                insert: c.insert.load(Ordering::Relaxed),
                query: c.query.load(Ordering::Relaxed),
                update: c.update.load(Ordering::Relaxed),
                delete: c.delete.load(Ordering::Relaxed),
                getmore: 0,
                command: c.command.load(Ordering::Relaxed),
            },
            connections: Connections {
                current: active,
                available: MAX_CONNECTIONS.saturating_sub(active),
                total_created: 1,
                active,
            },
        })
    }
}
