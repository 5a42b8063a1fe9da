//! V2 to V1 migration

use std::io;

use tracing::{debug, info};

use crate::codec::{CodecError, EnvelopeWriter};
use crate::storage::StorageService;

use super::error::{MigrateError, MigrateResult};
use super::walk::walk_topic_buckets_in;
use super::{V1_NAMESPACE, V2_NAMESPACE};

/// Counts from one reverse migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReverseStats {
    pub topics: usize,
    pub events: usize,
}

/// Rebuild the V1 envelopes from the V2 buckets
///
/// Every V2 topic bucket becomes one V1 key whose envelope lists the
/// bucket's events in key order, with the stored bytes embedded verbatim.
/// Existing V1 keys of the same topics are overwritten; other V1 keys are
/// left alone. The version marker is not read or changed.
pub fn migrate_v2_to_v1(service: &dyn StorageService) -> MigrateResult<ReverseStats> {
    let stats = service.store(V1_NAMESPACE).update(|tx| {
        let v2 = tx.namespace(V2_NAMESPACE)?;
        if !v2.exists() {
            return Err(MigrateError::MissingNamespace(V2_NAMESPACE.to_string()));
        }

        let mut stats = ReverseStats::default();
        walk_topic_buckets_in::<MigrateError, _>(&v2, |v2, name| {
            let topic = std::str::from_utf8(name).map_err(|_| MigrateError::Malformed {
                topic: String::from_utf8_lossy(name).into_owned(),
                source: invalid_utf8("topic name", name),
            })?;
            let malformed = |source: CodecError| MigrateError::Malformed {
                topic: topic.to_string(),
                source,
            };

            let mut writer = EnvelopeWriter::begin(Vec::new(), topic).map_err(malformed)?;
            if let Some(bucket) = v2.bucket(name)? {
                bucket.for_each(|id, raw| {
                    let id = std::str::from_utf8(id)
                        .map_err(|_| malformed(invalid_utf8("event ID", id)))?;
                    writer.event(id, raw).map_err(malformed)
                })?;
            }
            let events = writer.events();
            let envelope = writer.finish().map_err(malformed)?;

            tx.put(topic.as_bytes(), &envelope)?;
            debug!(topic, events, "restored topic envelope");
            stats.topics += 1;
            stats.events += events;
            Ok(())
        })?;
        Ok(stats)
    })?;

    info!(
        topics = stats.topics,
        events = stats.events,
        "migrated topic store to version 1"
    );
    Ok(stats)
}

fn invalid_utf8(what: &str, raw: &[u8]) -> CodecError {
    CodecError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} {:?} is not valid UTF-8", what, String::from_utf8_lossy(raw)),
    ))
}
