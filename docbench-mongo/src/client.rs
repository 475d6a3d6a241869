use std::time::Duration;

use docbench_core::{
    Connections, ExecError, ExecResult, Executor, OpCounters, ServerStatus, Target, WriteCounts,
    WriteModel,
};
use docbench_value::{DocId, Document};
use mongodb::bson::{self, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::{debug, warn};

use crate::convert::{doc_id_to_bson, from_bson_document, reply_u64, to_bson_document};
use crate::kind::classify;
use crate::{Error, Result};

const NAMESPACE_NOT_FOUND: i32 = 26;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub app_name: String,
    /// Applied unless the connection string sets its own.
    pub server_selection_timeout: Duration,
    pub max_pool_size: Option<u32>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            app_name: "docbench".to_string(),
            server_selection_timeout: Duration::from_secs(5),
            max_pool_size: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoExecutor {
    client: Client,
}

fn exec_err(err: mongodb::error::Error) -> ExecError {
    ExecError::new(classify(&err), err.to_string())
}

/// Documents an ordered `insert_many` wrote before `err` stopped it.
///
/// An ordered insert halts at its first write error, so that error's index is the
/// number of documents written. A batch failing only on write concern was fully written.
fn inserted_before_failure(err: &mongodb::error::Error, requested: u64) -> u64 {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().map(|e| e.index).min())
            .map_or(requested, |index| (index as u64).min(requested)),
        _ => 0,
    }
}

impl MongoExecutor {
    /// Builds a client. No connection is made until the first operation.
    pub async fn connect(uri: &str, options: &ConnectOptions) -> Result<Self> {
        let mut opts = ClientOptions::parse(uri)
            .await
            .map_err(|source| Error::InvalidUri {
                uri: uri.to_string(),
                source,
            })?;
        opts.app_name
            .get_or_insert_with(|| options.app_name.clone());
        opts.server_selection_timeout
            .get_or_insert(options.server_selection_timeout);
        if options.max_pool_size.is_some() {
            opts.max_pool_size = options.max_pool_size;
        }

        let client = Client::with_options(opts).map_err(Error::Client)?;
        Ok(Self { client })
    }

    fn collection(&self, target: &Target) -> Collection<bson::Document> {
        self.client
            .database(target.database())
            .collection(target.collection())
    }

    /// Runs one write command of an unordered bulk write and returns the reply.
    async fn write_command(
        &self,
        target: &Target,
        command: bson::Document,
    ) -> ExecResult<bson::Document> {
        let reply = self
            .client
            .database(target.database())
            .run_command(command)
            .await
            .map_err(exec_err)?;

        if let Ok(errors) = reply.get_array("writeErrors")
            && !errors.is_empty()
        {
            let first = errors
                .first()
                .and_then(|e| e.as_document())
                .and_then(|e| e.get_str("errmsg").ok())
                .unwrap_or("unknown write error");
            warn!(collection = %target, count = errors.len(), first, "bulk write reported write errors");
        }
        Ok(reply)
    }
}

impl Executor for MongoExecutor {
    async fn ping(&self) -> ExecResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(exec_err)
    }

    async fn insert_one(&self, target: &Target, doc: Document) -> ExecResult<()> {
        self.collection(target)
            .insert_one(to_bson_document(&doc))
            .await
            .map(|_| ())
            .map_err(exec_err)
    }

    async fn insert_many(&self, target: &Target, docs: Vec<Document>) -> ExecResult<u64> {
        if docs.is_empty() {
            return Ok(0);
        }
        let requested = docs.len() as u64;
        let docs: Vec<bson::Document> = docs.iter().map(to_bson_document).collect();
        match self.collection(target).insert_many(docs).await {
            Ok(res) => Ok(res.inserted_ids.len() as u64),
            Err(err) => {
                let inserted = inserted_before_failure(&err, requested);
                Err(exec_err(err).with_applied(WriteCounts::inserted(inserted)))
            }
        }
    }

    async fn bulk_write(
        &self,
        target: &Target,
        models: Vec<WriteModel>,
    ) -> ExecResult<WriteCounts> {
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for model in models {
            match model {
                WriteModel::InsertOne(doc) => inserts.push(to_bson_document(&doc)),
                WriteModel::UpdateOne { id, set } => updates.push(doc! {
                    "q": { "_id": doc_id_to_bson(&id) },
                    "u": { "$set": to_bson_document(&set) },
                }),
                WriteModel::DeleteOne { id } => deletes.push(doc! {
                    "q": { "_id": doc_id_to_bson(&id) },
                    "limit": 1,
                }),
            }
        }

        let coll = target.collection();
        let mut applied = WriteCounts::default();
        if !inserts.is_empty() {
            let reply = self
                .write_command(
                    target,
                    doc! { "insert": coll, "documents": inserts, "ordered": false },
                )
                .await?;
            applied.inserted = reply_u64(&reply, "n");
        }
        if !updates.is_empty() {
            let reply = self
                .write_command(
                    target,
                    doc! { "update": coll, "updates": updates, "ordered": false },
                )
                .await?;
            applied.updated = reply_u64(&reply, "nModified");
        }
        if !deletes.is_empty() {
            let reply = self
                .write_command(
                    target,
                    doc! { "delete": coll, "deletes": deletes, "ordered": false },
                )
                .await?;
            applied.deleted = reply_u64(&reply, "n");
        }
        Ok(applied)
    }

    async fn find_by_id(&self, target: &Target, id: &DocId) -> ExecResult<Option<Document>> {
        let found = self
            .collection(target)
            .find_one(doc! { "_id": doc_id_to_bson(id) })
            .await
            .map_err(exec_err)?;
        Ok(found.as_ref().map(from_bson_document))
    }

    async fn count(&self, target: &Target) -> ExecResult<u64> {
        self.collection(target)
            .count_documents(doc! {})
            .await
            .map_err(exec_err)
    }

    async fn clear(&self, target: &Target) -> ExecResult<u64> {
        self.collection(target)
            .delete_many(doc! {})
            .await
            .map(|res| res.deleted_count)
            .map_err(exec_err)
    }

    async fn drop_target(&self, target: &Target) -> ExecResult<()> {
        match self.collection(target).drop().await {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(err.kind.as_ref(), ErrorKind::Command(c) if c.code == NAMESPACE_NOT_FOUND) =>
            {
                debug!(collection = %target, "drop skipped; namespace does not exist");
                Ok(())
            }
            Err(err) => Err(exec_err(err)),
        }
    }

    async fn server_status(&self) -> ExecResult<ServerStatus> {
        let reply = self
            .client
            .database("admin")
            .run_command(doc! { "serverStatus": 1 })
            .await
            .map_err(exec_err)?;

        let empty = bson::Document::new();
        let ops = reply.get_document("opcounters").unwrap_or(&empty);
        let conns = reply.get_document("connections").unwrap_or(&empty);

        Ok(ServerStatus {
            opcounters: OpCounters {
                insert: reply_u64(ops, "insert"),
                query: reply_u64(ops, "query"),
                update: reply_u64(ops, "update"),
                delete: reply_u64(ops, "delete"),
                getmore: reply_u64(ops, "getmore"),
                command: reply_u64(ops, "command"),
            },
            connections: Connections {
                current: reply_u64(conns, "current"),
                available: reply_u64(conns, "available"),
                total_created: reply_u64(conns, "totalCreated"),
                active: reply_u64(conns, "active"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use docbench_core::FailureKind;
    use docbench_value::ID_FIELD;

    use super::*;

    /// Set to a disposable server to run the live round trip.
    const LIVE_URI_ENV: &str = "DOCBENCH_TEST_MONGO_URI";

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        let res = MongoExecutor::connect("not-a-uri", &ConnectOptions::default()).await;
        assert!(matches!(res, Err(Error::InvalidUri { .. })));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() -> Result<()> {
        let options = ConnectOptions {
            server_selection_timeout: Duration::from_millis(200),
            ..ConnectOptions::default()
        };
        let executor = MongoExecutor::connect("mongodb://127.0.0.1:9/", &options).await?;

        let err = executor
            .ping()
            .await
            .err()
            .unwrap_or_else(|| panic!("ping unexpectedly succeeded"));
        assert_eq!(err.kind, FailureKind::Transient);
        Ok(())
    }

    #[tokio::test]
    async fn live_bulk_write_round_trip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let Ok(uri) = std::env::var(LIVE_URI_ENV) else {
            return Ok(());
        };
        let executor = MongoExecutor::connect(&uri, &ConnectOptions::default()).await?;
        let target = Target::new("docbench_test", "bulk");
        executor.drop_target(&target).await?;

        let models = vec![
            WriteModel::InsertOne(Document::new().with(ID_FIELD, "a").with("status", "draft")),
            WriteModel::InsertOne(Document::new().with(ID_FIELD, "b").with("status", "draft")),
            WriteModel::UpdateOne {
                id: DocId::from("a"),
                set: Document::new().with("status", "published"),
            },
            WriteModel::DeleteOne { id: DocId::from("b") },
        ];
        let applied = executor.bulk_write(&target, models).await?;
        assert_eq!(
            applied,
            WriteCounts {
                inserted: 2,
                updated: 1,
                deleted: 1
            }
        );
        assert_eq!(executor.count(&target).await?, 1);

        executor.drop_target(&target).await?;
        Ok(())
    }

    #[tokio::test]
    async fn live_partial_insert_many_reports_written_documents()
    -> std::result::Result<(), Box<dyn std::error::Error>> {
        let Ok(uri) = std::env::var(LIVE_URI_ENV) else {
            return Ok(());
        };
        let executor = MongoExecutor::connect(&uri, &ConnectOptions::default()).await?;
        let target = Target::new("docbench_test", "partial");
        executor.drop_target(&target).await?;
        executor
            .insert_one(&target, Document::new().with(ID_FIELD, 2i64))
            .await?;

        let docs = (0..5i64)
            .map(|i| Document::new().with(ID_FIELD, i))
            .collect();
        let err = executor
            .insert_many(&target, docs)
            .await
            .err()
            .unwrap_or_else(|| panic!("duplicate key should fail the batch"));
        assert_eq!(err.kind, FailureKind::Permanent);
        assert_eq!(err.applied, WriteCounts::inserted(2));
        assert_eq!(executor.count(&target).await?, 3);

        executor.drop_target(&target).await?;
        Ok(())
    }
}
