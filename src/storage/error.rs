//! Storage errors

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("column conversion error: {0}")]
    Column(#[from] rusqlite::types::FromSqlError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key required")]
    KeyRequired,
    #[error("bucket name required")]
    BucketNameRequired,
    #[error("bucket already exists: {0:?}")]
    BucketExists(String),
    #[error("bucket not found: {0:?}")]
    BucketNotFound(String),
    /// A key was used as a bucket name or the other way around
    #[error("incompatible value for {0:?}")]
    IncompatibleValue(String),
    #[error("transaction not writable")]
    TxNotWritable,
    #[error("database is closed")]
    Closed,
    #[error("value of {0:?} is not valid UTF-8")]
    InvalidUtf8(String),
}
