use thiserror::Error;

/// Failures talking to the property service. The loader logs these and
/// degrades to empty results; they never reach the selection flow.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("query failed: {0}")]
    Query(String),
    #[error("response carried no data")]
    MissingData,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the persistent key-value store. The cache logs these and keeps
/// serving from memory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
