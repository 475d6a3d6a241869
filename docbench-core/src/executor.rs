use std::fmt;
use std::future::Future;
use std::ops::Add;
use std::str::FromStr;
use std::sync::Arc;

use docbench_value::{DocId, Document};
use serde::{Serialize, Serializer};

use crate::runner::FailureKind;

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Error reported by an executor adapter, already classified by that adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ExecError {
    pub kind: FailureKind,
    pub message: String,
    /// Writes the executor applied before the call failed (a partially applied batch).
    pub applied: WriteCounts,
}

impl ExecError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            applied: WriteCounts::default(),
        }
    }

    #[must_use]
    pub fn with_applied(mut self, applied: WriteCounts) -> Self {
        self.applied = applied;
        self
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}

/// A logical (database, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    database: Arc<str>,
    collection: Arc<str>,
}

impl Target {
    pub fn new(database: &str, collection: &str) -> Self {
        Self {
            database: Arc::from(database),
            collection: Arc::from(collection),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for Target {
    type Err = String;

    /// Parses `database.collection`. The collection part may itself contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(format!(
                "invalid target '{s}' (expected <database>.<collection>)"
            )),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One entry of an unordered bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne(Document),
    /// `$set` the given fields on the document with this id.
    UpdateOne { id: DocId, set: Document },
    DeleteOne { id: DocId },
}

/// Per-category write counts, either requested or actually applied by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl WriteCounts {
    pub fn inserted(n: u64) -> Self {
        Self {
            inserted: n,
            ..Self::default()
        }
    }

    pub fn of(models: &[WriteModel]) -> Self {
        let mut out = Self::default();
        for m in models {
            match m {
                WriteModel::InsertOne(_) => out.inserted += 1,
                WriteModel::UpdateOne { .. } => out.updated += 1,
                WriteModel::DeleteOne { .. } => out.deleted += 1,
            }
        }
        out
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Caps each category at `limit`.
    pub fn clamped_to(self, limit: &WriteCounts) -> Self {
        Self {
            inserted: self.inserted.min(limit.inserted),
            updated: self.updated.min(limit.updated),
            deleted: self.deleted.min(limit.deleted),
        }
    }
}

impl Add for WriteCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            inserted: self.inserted + rhs.inserted,
            updated: self.updated + rhs.updated,
            deleted: self.deleted + rhs.deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounters {
    pub insert: u64,
    pub query: u64,
    pub update: u64,
    pub delete: u64,
    pub getmore: u64,
    pub command: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Connections {
    pub current: u64,
    pub available: u64,
    pub total_created: u64,
    pub active: u64,
}

/// Counters returned by the administrative status query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub opcounters: OpCounters,
    pub connections: Connections,
}

/// Client handle to the database under test.
///
/// Implementations own their connection; callers share them behind an `Arc` for the
/// lifetime of a run. Every error must be classified into a [`FailureKind`] so the
/// harness never has to inspect driver-specific error shapes.
pub trait Executor: Send + Sync + 'static {
    /// Round-trip used to detect an unreachable executor before a run starts.
    fn ping(&self) -> impl Future<Output = ExecResult<()>> + Send;

    fn insert_one(
        &self,
        target: &Target,
        doc: Document,
    ) -> impl Future<Output = ExecResult<()>> + Send;

    /// Inserts a batch and returns how many documents were actually inserted.
    fn insert_many(
        &self,
        target: &Target,
        docs: Vec<Document>,
    ) -> impl Future<Output = ExecResult<u64>> + Send;

    /// Unordered bulk write; the executor may apply the models in any order and
    /// reports what it applied.
    fn bulk_write(
        &self,
        target: &Target,
        models: Vec<WriteModel>,
    ) -> impl Future<Output = ExecResult<WriteCounts>> + Send;

    fn find_by_id(
        &self,
        target: &Target,
        id: &DocId,
    ) -> impl Future<Output = ExecResult<Option<Document>>> + Send;

    fn count(&self, target: &Target) -> impl Future<Output = ExecResult<u64>> + Send;

    /// Deletes every document, returning how many were removed.
    fn clear(&self, target: &Target) -> impl Future<Output = ExecResult<u64>> + Send;

    /// Drops the target. Dropping a target that does not exist is not an error.
    fn drop_target(&self, target: &Target) -> impl Future<Output = ExecResult<()>> + Send;

    fn server_status(&self) -> impl Future<Output = ExecResult<ServerStatus>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parses_database_and_collection() {
        let t: Target = "idhackDB.contentItems".parse().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.database(), "idhackDB");
        assert_eq!(t.collection(), "contentItems");
        assert_eq!(t.to_string(), "idhackDB.contentItems");

        let nested: Target = "db.system.profile".parse().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(nested.collection(), "system.profile");
    }

    #[test]
    fn target_rejects_missing_parts() {
        assert!("nodot".parse::<Target>().is_err());
        assert!(".coll".parse::<Target>().is_err());
        assert!("db.".parse::<Target>().is_err());
    }

    #[test]
    fn write_counts_of_models_and_clamp() {
        let models = vec![
            WriteModel::InsertOne(Document::new()),
            WriteModel::InsertOne(Document::new()),
            WriteModel::UpdateOne {
                id: DocId::from(1i64),
                set: Document::new(),
            },
            WriteModel::DeleteOne { id: DocId::from(2i64) },
        ];
        let requested = WriteCounts::of(&models);
        assert_eq!(
            requested,
            WriteCounts {
                inserted: 2,
                updated: 1,
                deleted: 1
            }
        );

        let reported = WriteCounts {
            inserted: 5,
            updated: 0,
            deleted: 1,
        };
        assert_eq!(
            reported.clamped_to(&requested),
            WriteCounts {
                inserted: 2,
                updated: 0,
                deleted: 1
            }
        );
    }
}
