//! MongoDB adapter for the docbench [`Executor`](docbench_core::Executor) contract.

mod client;
mod convert;
mod kind;

pub use client::{ConnectOptions, MongoExecutor};
pub use convert::{doc_id_to_bson, from_bson_document, to_bson, to_bson_document};
pub use kind::{TRANSIENT_CODES, classify, classify_code};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid connection string `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("failed to create client: {0}")]
    Client(#[source] mongodb::error::Error),
}
