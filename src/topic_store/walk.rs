//! Iteration over bucket-per-topic namespaces

use crate::storage::{Namespace, ReadTx, StoreError};

/// Call `f` once for every top-level bucket of `namespace`, in name order
///
/// Runs in one read-only transaction and stops at the first error. `f` gets
/// the raw bucket name; nothing is assumed about its encoding.
pub fn walk_topic_buckets<E, F>(namespace: &Namespace, f: F) -> Result<(), E>
where
    E: From<StoreError>,
    F: FnMut(&ReadTx<'_>, &[u8]) -> Result<(), E>,
{
    namespace.view(|tx| walk_topic_buckets_in(tx, f))
}

/// Same as `walk_topic_buckets`, inside an open transaction
///
/// Bucket names are read before the first call, so `f` may write to other
/// namespaces of the same transaction.
pub fn walk_topic_buckets_in<E, F>(tx: &ReadTx<'_>, mut f: F) -> Result<(), E>
where
    E: From<StoreError>,
    F: FnMut(&ReadTx<'_>, &[u8]) -> Result<(), E>,
{
    for name in tx.bucket_names()? {
        f(tx, &name)?;
    }
    Ok(())
}
