use docbench_core::{
    ExecResult, Executor, ServerStatus, Target, WriteCounts, WriteModel,
};
use docbench_memstore::MemStore;
use docbench_value::{DocId, Document};

use crate::run_error::RunError;

/// The executor selected by `--uri`.
#[derive(Debug)]
pub enum AnyExecutor {
    Memory(MemStore),
    #[cfg(feature = "mongodb")]
    Mongo(docbench_mongo::MongoExecutor),
}

macro_rules! dispatch {
    ($self:ident, $e:ident => $call:expr) => {
        match $self {
            AnyExecutor::Memory($e) => $call,
            #[cfg(feature = "mongodb")]
            AnyExecutor::Mongo($e) => $call,
        }
    };
}

impl AnyExecutor {
    pub async fn connect(uri: &str) -> Result<Self, RunError> {
        if MemStore::handles(uri) {
            return Ok(Self::Memory(MemStore::new()));
        }

        let uri = uri.trim();
        if !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) {
            return Err(RunError::InvalidInput(anyhow::anyhow!(
                "unsupported uri `{uri}` (expected mongodb://, mongodb+srv:// or memory://)"
            )));
        }
        Self::connect_mongo(uri).await
    }

    #[cfg(feature = "mongodb")]
    async fn connect_mongo(uri: &str) -> Result<Self, RunError> {
        use docbench_mongo::{ConnectOptions, Error, MongoExecutor};

        match MongoExecutor::connect(uri, &ConnectOptions::default()).await {
            Ok(executor) => Ok(Self::Mongo(executor)),
            Err(err @ Error::InvalidUri { .. }) => Err(RunError::InvalidInput(err.into())),
            Err(err) => Err(RunError::ExecutorUnavailable(err.into())),
        }
    }

    #[cfg(not(feature = "mongodb"))]
    async fn connect_mongo(uri: &str) -> Result<Self, RunError> {
        Err(RunError::InvalidInput(anyhow::anyhow!(
            "`{uri}` needs MongoDB support; rebuild with `--features mongodb`"
        )))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "mongodb")]
            Self::Mongo(_) => "mongodb",
        }
    }
}

impl Executor for AnyExecutor {
    async fn ping(&self) -> ExecResult<()> {
        dispatch!(self, e => e.ping().await)
    }

    async fn insert_one(&self, target: &Target, doc: Document) -> ExecResult<()> {
        dispatch!(self, e => e.insert_one(target, doc).await)
    }

    async fn insert_many(&self, target: &Target, docs: Vec<Document>) -> ExecResult<u64> {
        dispatch!(self, e => e.insert_many(target, docs).await)
    }

    async fn bulk_write(&self, target: &Target, models: Vec<WriteModel>) -> ExecResult<WriteCounts> {
        dispatch!(self, e => e.bulk_write(target, models).await)
    }

    async fn find_by_id(&self, target: &Target, id: &DocId) -> ExecResult<Option<Document>> {
        dispatch!(self, e => e.find_by_id(target, id).await)
    }

    async fn count(&self, target: &Target) -> ExecResult<u64> {
        dispatch!(self, e => e.count(target).await)
    }

    async fn clear(&self, target: &Target) -> ExecResult<u64> {
        dispatch!(self, e => e.clear(target).await)
    }

    async fn drop_target(&self, target: &Target) -> ExecResult<()> {
        dispatch!(self, e => e.drop_target(target).await)
    }

    async fn server_status(&self) -> ExecResult<ServerStatus> {
        dispatch!(self, e => e.server_status().await)
    }
}
