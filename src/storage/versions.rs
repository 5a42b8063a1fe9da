//! Schema version bookkeeping

use super::db::Namespace;
use super::error::{StoreError, StoreResult};

/// Namespace holding one version string per versioned store
pub const VERSIONS_NAMESPACE: &str = "versions";

/// Version markers keyed by store id
///
/// Every call is its own transaction.
pub trait Versions {
    /// Current version of `id`; `None` when it was never set
    fn get(&self, id: &str) -> StoreResult<Option<String>>;

    fn set(&self, id: &str, version: &str) -> StoreResult<()>;
}

/// `Versions` backed by the `versions` namespace
#[derive(Clone)]
pub struct VersionStore {
    ns: Namespace,
}

impl VersionStore {
    pub(crate) fn new(ns: Namespace) -> Self {
        Self { ns }
    }
}

impl Versions for VersionStore {
    fn get(&self, id: &str) -> StoreResult<Option<String>> {
        let raw = self.ns.view(|tx| tx.get(id.as_bytes()))?;
        raw.map(|bytes| String::from_utf8(bytes).map_err(|_| StoreError::InvalidUtf8(id.to_string())))
            .transpose()
    }

    fn set(&self, id: &str, version: &str) -> StoreResult<()> {
        self.ns.update(|tx| tx.put(id.as_bytes(), version.as_bytes()))
    }
}
