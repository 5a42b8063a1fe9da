//! Storage Module for the embedded key-value store
//!
//! This module provides the transactional store that topic state lives in:
//! - `Database`: One store file, one connection, named namespaces
//! - `Namespace`: Read-write (`update`) and read-only (`view`) transactions
//! - `Bucket`: Nested, ordered key-value containers inside a transaction
//! - `Versions`: Schema version markers in the `versions` namespace
//!
//! # Layout
//!
//! ```text
//! store file
//! ├── alert_store            (namespace)
//! │   └── <topic> = <blob>
//! ├── topic_states_store     (namespace)
//! │   └── <topic>/           (bucket)
//! │       └── <event id> = <event state>
//! └── versions               (namespace)
//!     └── topic_store_version = "2"
//! ```

use std::io;
use std::path::Path;

mod config;
mod db;
mod error;
mod tx;
mod versions;

pub use config::{StorageConfig, BUSY_TIMEOUT_ENV, PATH_ENV};
pub use db::{Database, Namespace};
pub use error::{StoreError, StoreResult};
pub use tx::{Bucket, ReadTx, Tx};
pub use versions::{VersionStore, Versions, VERSIONS_NAMESPACE};

/// What migrations need from a store
///
/// `Database` is the production implementation; tests wrap it to inject
/// failures at chosen steps.
pub trait StorageService {
    /// Handle to a namespace
    fn store(&self, namespace: &str) -> Namespace;

    fn versions(&self) -> &dyn Versions;

    /// Path of the store file
    fn path(&self) -> &Path;

    /// Run `f` on the store file with the connection closed
    fn with_file_detached(&self, f: &mut dyn FnMut(&Path) -> io::Result<()>) -> StoreResult<()>;
}

impl StorageService for Database {
    fn store(&self, namespace: &str) -> Namespace {
        Database::store(self, namespace)
    }

    fn versions(&self) -> &dyn Versions {
        Database::versions(self)
    }

    fn path(&self) -> &Path {
        Database::path(self)
    }

    fn with_file_detached(&self, f: &mut dyn FnMut(&Path) -> io::Result<()>) -> StoreResult<()> {
        Database::with_file_detached(self, f)
    }
}
