//! Database - the single store file and its namespaces
//!
//! One SQLite connection is shared behind a mutex, so exactly one
//! transaction (read or write) runs at a time and every transaction sees a
//! consistent snapshot. Journal mode `DELETE` keeps all committed state in
//! the one file: once no transaction is open, copying that file copies the
//! whole store.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use super::config::StorageConfig;
use super::error::{StoreError, StoreResult};
use super::tx::{self, ReadTx, Tx, ROOT, SCHEMA};
use super::versions::VersionStore;

struct Shared {
    config: StorageConfig,
    conn: Mutex<Option<Connection>>,
}

/// The embedded store
pub struct Database {
    shared: Arc<Shared>,
    versions: VersionStore,
}

impl Database {
    /// Open (or create) the store file
    pub fn open(config: StorageConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = open_connection(&config)?;
        debug!(path = %config.path.display(), "opened topic store database");

        let shared = Arc::new(Shared {
            config,
            conn: Mutex::new(Some(conn)),
        });
        let versions = VersionStore::new(Namespace::new(shared.clone(), super::VERSIONS_NAMESPACE));
        Ok(Self { shared, versions })
    }

    /// Close the connection; later transactions fail with `StoreError::Closed`
    pub fn close(&self) -> StoreResult<()> {
        if let Some(conn) = self.shared.conn.lock().take() {
            conn.close().map_err(|(_, e)| StoreError::Sql(e))?;
            debug!(path = %self.path().display(), "closed topic store database");
        }
        Ok(())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.shared.config
    }

    pub fn path(&self) -> &Path {
        &self.shared.config.path
    }

    /// Handle to a namespace; it is created on first write
    pub fn store(&self, namespace: &str) -> Namespace {
        Namespace::new(self.shared.clone(), namespace)
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Names of all namespaces in order
    pub fn namespaces(&self) -> StoreResult<Vec<String>> {
        self.shared.read(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM buckets WHERE parent = ?1 ORDER BY name")?;
            let names = stmt
                .query_map([ROOT], |row| row.get::<_, Vec<u8>>(0))?
                .map(|name| name.map(|n| String::from_utf8_lossy(&n).into_owned()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }

    /// Delete a namespace and everything in it; returns whether it existed
    pub fn delete_namespace(&self, namespace: &str) -> StoreResult<bool> {
        self.store(namespace).delete()
    }

    /// Run `f` on the store file while no connection is open
    ///
    /// Holds the connection lock throughout, so no transaction can observe a
    /// file that is being copied or replaced. The connection is reopened
    /// afterwards whether or not `f` succeeded.
    pub fn with_file_detached<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        let mut guard = self.shared.conn.lock();
        let conn = guard.take().ok_or(StoreError::Closed)?;
        if let Err((conn, e)) = conn.close() {
            *guard = Some(conn);
            return Err(StoreError::Sql(e));
        }

        let path = &self.shared.config.path;
        let result = f(path);
        *guard = Some(open_connection(&self.shared.config)?);
        debug!(path = %path.display(), ok = result.is_ok(), "reattached topic store database");
        Ok(result?)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "closing topic store database on drop");
        }
    }
}

impl Shared {
    fn read<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        f(&txn)
    }
}

/// Handle to one namespace of the store
#[derive(Clone)]
pub struct Namespace {
    shared: Arc<Shared>,
    name: String,
}

impl Namespace {
    fn new(shared: Arc<Shared>, name: &str) -> Self {
        Self {
            shared,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` in a read-write transaction
    ///
    /// Commits when `f` returns `Ok`; rolls back this transaction when it
    /// returns `Err`.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
    {
        let mut guard = self.shared.conn.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let txn = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let out = {
            let tx = Tx::open(&txn, &self.name)?;
            f(&tx)?
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Run `f` in a read-only transaction
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
    {
        let mut guard = self.shared.conn.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let txn = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        let tx = ReadTx::open(&txn, &self.name)?;
        f(&tx)
    }

    /// Whether the namespace has been created
    pub fn exists(&self) -> StoreResult<bool> {
        self.view(|tx| Ok(tx.exists()))
    }

    /// Delete the namespace and everything in it; returns whether it existed
    pub fn delete(&self) -> StoreResult<bool> {
        let mut guard = self.shared.conn.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existed = match tx::find_bucket(&txn, ROOT, self.name.as_bytes())? {
            Some(id) => {
                tx::delete_tree(&txn, id)?;
                true
            }
            None => false,
        };
        txn.commit()?;
        Ok(existed)
    }
}

fn open_connection(config: &StorageConfig) -> StoreResult<Connection> {
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(config.busy_timeout)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
    debug!(journal_mode = %mode, "configured topic store connection");
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}
