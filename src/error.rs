//! Error types / 错误类型

use thiserror::Error;

use crate::search::schema::{DocAddress, PartitionId};

/// Errors raised by the search side (index partitions, readers, searcher)
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to open index partition {partition}: {source}")]
    OpenPartition {
        partition: PartitionId,
        #[source]
        source: sqlx::Error,
    },

    #[error("index query failed: {0}")]
    Index(#[source] sqlx::Error),

    #[error("reader for partition {0} is not open")]
    ReaderNotOpen(PartitionId),

    #[error("entity `{0}` is not registered for indexing")]
    UnknownEntity(String),

    #[error("document {0} not found in reader")]
    DocumentNotFound(DocAddress),

    #[error("batch insert into {partition} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        partition: PartitionId,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the persistence session
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

/// SQLite reports lock contention as a plain database error / SQLite 锁冲突
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked") || msg.contains("SQLITE_BUSY")
}
