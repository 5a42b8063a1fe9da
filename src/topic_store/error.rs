//! Migration errors

use std::io;
use std::path::PathBuf;

use crate::codec::CodecError;
use crate::storage::StoreError;

/// Result type for topic store migrations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur while migrating the topic store
///
/// Each variant names the step that failed; the underlying cause is kept as
/// the error source.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Taking the backup failed; the store was not touched
    #[error("failed to back up {path:?}: {source}")]
    Backup { path: PathBuf, source: io::Error },

    /// A stored record could not be read
    #[error("malformed record for topic {topic:?}: {source}")]
    Malformed { topic: String, source: CodecError },

    /// The namespace to migrate from does not exist
    #[error("namespace not found: {0:?}")]
    MissingNamespace(String),

    /// Reading or writing the version marker failed
    #[error("failed to update topic store version: {0}")]
    Version(#[source] StoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The migration failed and so did putting the backup back
    ///
    /// The backup is left at `path` and is restored by the next attempt.
    #[error("failed to restore {path:?} after error ({cause}): {source}")]
    Restore {
        path: PathBuf,
        source: io::Error,
        cause: Box<MigrateError>,
    },

    /// A backup left by an interrupted attempt could not be put back
    #[error("failed to restore backup {path:?} of an interrupted migration: {source}")]
    Recover { path: PathBuf, source: io::Error },
}

impl MigrateError {
    /// The error that started a failed restore, or `self`
    pub fn root_cause(&self) -> &MigrateError {
        match self {
            MigrateError::Restore { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
