//! Transactions and nested buckets
//!
//! Buckets live in two tables: `buckets` holds the tree (each row names a
//! child of its `parent`, `0` being the file root) and `entries` holds the
//! key/value pairs of every bucket. Names and keys are stored as BLOBs, so
//! SQLite's memcmp ordering gives lexicographic byte order.
//!
//! A key and a sub-bucket of the same bucket may not share a name.

use std::ops::Deref;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::{StoreError, StoreResult};

/// Parent id of top-level (namespace) buckets
pub(crate) const ROOT: i64 = 0;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS buckets (
    id     INTEGER PRIMARY KEY,
    parent INTEGER NOT NULL,
    name   BLOB NOT NULL,
    UNIQUE (parent, name)
);
CREATE TABLE IF NOT EXISTS entries (
    bucket INTEGER NOT NULL,
    key    BLOB NOT NULL,
    value  BLOB NOT NULL,
    PRIMARY KEY (bucket, key)
) WITHOUT ROWID;
";

/// A bucket inside a transaction
///
/// Copies are cheap; all of them refer to the same transaction.
#[derive(Clone, Copy)]
pub struct Bucket<'t> {
    conn: &'t Connection,
    id: i64,
    writable: bool,
}

impl<'t> Bucket<'t> {
    pub(crate) fn new(conn: &'t Connection, id: i64, writable: bool) -> Self {
        Self { conn, id, writable }
    }

    /// Whether this bucket belongs to a read-write transaction
    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM entries WHERE bucket = ?1 AND key = ?2")?;
        Ok(stmt
            .query_row(params![self.id, key], |row| row.get(0))
            .optional()?)
    }

    pub fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM entries WHERE bucket = ?1 AND key = ?2")?;
        Ok(stmt.exists(params![self.id, key])?)
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        if find_bucket(self.conn, self.id, key)?.is_some() {
            return Err(StoreError::IncompatibleValue(display(key)));
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO entries (bucket, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value",
        )?;
        stmt.execute(params![self.id, key, value])?;
        Ok(())
    }

    /// Remove `key`; removing a missing key is not an error
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM entries WHERE bucket = ?1 AND key = ?2")?;
        stmt.execute(params![self.id, key])?;
        Ok(())
    }

    /// Visit every key/value pair in key order
    ///
    /// The bucket must not be modified from inside `f`.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM entries WHERE bucket = ?1 ORDER BY key")
            .map_err(StoreError::from)?;
        let mut rows = stmt.query([self.id]).map_err(StoreError::from)?;
        while let Some(row) = rows.next().map_err(StoreError::from)? {
            f(blob(row, 0)?, blob(row, 1)?)?;
        }
        Ok(())
    }

    /// All keys in order
    pub fn keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM entries WHERE bucket = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map([self.id], |row| row.get(0))?
            .collect::<Result<Vec<Vec<u8>>, _>>()?;
        Ok(keys)
    }

    /// Number of keys (sub-buckets not included)
    pub fn len(&self) -> StoreResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM entries WHERE bucket = ?1")?;
        let count: i64 = stmt.query_row([self.id], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0 && self.bucket_names()?.is_empty())
    }

    /// Open a sub-bucket
    pub fn bucket(&self, name: &[u8]) -> StoreResult<Option<Bucket<'t>>> {
        Ok(find_bucket(self.conn, self.id, name)?.map(|id| Bucket::new(self.conn, id, self.writable)))
    }

    /// Names of all sub-buckets in order
    pub fn bucket_names(&self) -> StoreResult<Vec<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name FROM buckets WHERE parent = ?1 ORDER BY name")?;
        let names = stmt
            .query_map([self.id], |row| row.get(0))?
            .collect::<Result<Vec<Vec<u8>>, _>>()?;
        Ok(names)
    }

    /// Create a sub-bucket; fails if it already exists
    pub fn create_bucket(&self, name: &[u8]) -> StoreResult<Bucket<'t>> {
        self.check_writable()?;
        if find_bucket(self.conn, self.id, name)?.is_some() {
            return Err(StoreError::BucketExists(display(name)));
        }
        self.insert_bucket(name)
    }

    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> StoreResult<Bucket<'t>> {
        self.check_writable()?;
        match find_bucket(self.conn, self.id, name)? {
            Some(id) => Ok(Bucket::new(self.conn, id, true)),
            None => self.insert_bucket(name),
        }
    }

    /// Delete a sub-bucket and everything below it
    pub fn delete_bucket(&self, name: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        let id = find_bucket(self.conn, self.id, name)?
            .ok_or_else(|| StoreError::BucketNotFound(display(name)))?;
        delete_tree(self.conn, id)
    }

    /// Remove every key and sub-bucket
    pub fn clear(&self) -> StoreResult<()> {
        self.check_writable()?;
        for name in self.bucket_names()? {
            self.delete_bucket(&name)?;
        }
        self.conn
            .prepare_cached("DELETE FROM entries WHERE bucket = ?1")?
            .execute([self.id])?;
        Ok(())
    }

    fn insert_bucket(&self, name: &[u8]) -> StoreResult<Bucket<'t>> {
        if name.is_empty() {
            return Err(StoreError::BucketNameRequired);
        }
        if self.exists(name)? {
            return Err(StoreError::IncompatibleValue(display(name)));
        }
        let id = insert_bucket(self.conn, self.id, name)?;
        Ok(Bucket::new(self.conn, id, true))
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::TxNotWritable)
        }
    }
}

/// Read-only view of one namespace inside a transaction
///
/// When the namespace does not exist yet every read comes back empty.
pub struct ReadTx<'t> {
    conn: &'t Connection,
    root: Option<Bucket<'t>>,
}

impl<'t> ReadTx<'t> {
    pub(crate) fn new(conn: &'t Connection, root: Option<Bucket<'t>>) -> Self {
        Self { conn, root }
    }

    /// Open a namespace read-only, within the same transaction
    pub(crate) fn open(conn: &'t Connection, namespace: &str) -> StoreResult<Self> {
        let root = find_bucket(conn, ROOT, namespace.as_bytes())?.map(|id| Bucket::new(conn, id, false));
        Ok(Self::new(conn, root))
    }

    /// Whether the namespace exists
    pub fn exists(&self) -> bool {
        self.root.is_some()
    }

    /// The namespace's top-level bucket
    pub fn root(&self) -> Option<Bucket<'t>> {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match &self.root {
            Some(root) => root.get(key),
            None => Ok(None),
        }
    }

    pub fn bucket(&self, name: &[u8]) -> StoreResult<Option<Bucket<'t>>> {
        match &self.root {
            Some(root) => root.bucket(name),
            None => Ok(None),
        }
    }

    pub fn keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        match &self.root {
            Some(root) => root.keys(),
            None => Ok(Vec::new()),
        }
    }

    pub fn bucket_names(&self) -> StoreResult<Vec<Vec<u8>>> {
        match &self.root {
            Some(root) => root.bucket_names(),
            None => Ok(Vec::new()),
        }
    }

    pub fn for_each<E, F>(&self, f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        match &self.root {
            Some(root) => root.for_each(f),
            None => Ok(()),
        }
    }

    pub(crate) fn conn(&self) -> &'t Connection {
        self.conn
    }
}

/// Read-write transaction on one namespace
///
/// Dereferences to `ReadTx` for reads; the namespace bucket always exists.
pub struct Tx<'t> {
    read: ReadTx<'t>,
    root: Bucket<'t>,
}

impl<'t> Tx<'t> {
    /// Open a namespace for writing, creating its bucket if needed
    pub(crate) fn open(conn: &'t Connection, namespace: &str) -> StoreResult<Self> {
        let id = match find_bucket(conn, ROOT, namespace.as_bytes())? {
            Some(id) => id,
            None => insert_bucket(conn, ROOT, namespace.as_bytes())?,
        };
        let root = Bucket::new(conn, id, true);
        Ok(Self {
            read: ReadTx::new(conn, Some(root)),
            root,
        })
    }

    /// The namespace's top-level bucket, writable
    pub fn root_bucket(&self) -> Bucket<'t> {
        self.root
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.root.put(key, value)
    }

    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.root.delete(key)
    }

    pub fn create_bucket(&self, name: &[u8]) -> StoreResult<Bucket<'t>> {
        self.root.create_bucket(name)
    }

    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> StoreResult<Bucket<'t>> {
        self.root.create_bucket_if_not_exists(name)
    }

    pub fn delete_bucket(&self, name: &[u8]) -> StoreResult<()> {
        self.root.delete_bucket(name)
    }

    /// Remove everything in the namespace
    pub fn clear(&self) -> StoreResult<()> {
        self.root.clear()
    }

    /// Read another namespace inside this same transaction
    pub fn namespace(&self, name: &str) -> StoreResult<ReadTx<'t>> {
        ReadTx::open(self.read.conn(), name)
    }
}

impl<'t> Deref for Tx<'t> {
    type Target = ReadTx<'t>;

    fn deref(&self) -> &Self::Target {
        &self.read
    }
}

pub(crate) fn find_bucket(conn: &Connection, parent: i64, name: &[u8]) -> StoreResult<Option<i64>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM buckets WHERE parent = ?1 AND name = ?2")?;
    Ok(stmt
        .query_row(params![parent, name], |row| row.get(0))
        .optional()?)
}

fn insert_bucket(conn: &Connection, parent: i64, name: &[u8]) -> StoreResult<i64> {
    if name.is_empty() {
        return Err(StoreError::BucketNameRequired);
    }
    conn.prepare_cached("INSERT INTO buckets (parent, name) VALUES (?1, ?2)")?
        .execute(params![parent, name])?;
    Ok(conn.last_insert_rowid())
}

/// Delete bucket `id`, its descendants, and all their entries
pub(crate) fn delete_tree(conn: &Connection, id: i64) -> StoreResult<()> {
    let ids = {
        let mut stmt = conn.prepare_cached(
            "WITH RECURSIVE tree(id) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT b.id FROM buckets b JOIN tree ON b.parent = tree.id
             )
             SELECT id FROM tree",
        )?;
        let ids = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        ids
    };

    let mut entries = conn.prepare_cached("DELETE FROM entries WHERE bucket = ?1")?;
    let mut buckets = conn.prepare_cached("DELETE FROM buckets WHERE id = ?1")?;
    for id in ids {
        entries.execute([id])?;
        buckets.execute([id])?;
    }
    Ok(())
}

fn blob<'r>(row: &'r Row<'_>, idx: usize) -> StoreResult<&'r [u8]> {
    Ok(row.get_ref(idx)?.as_blob()?)
}

fn display(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
