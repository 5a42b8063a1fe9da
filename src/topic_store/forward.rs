//! V1 to V2 migration
//!
//! Moves every event of every V1 envelope into its own key of a per-topic
//! V2 bucket. Event bytes are copied as found in the envelope; nothing is
//! decoded except the event IDs.

use tracing::{debug, info, warn};

use crate::codec::EventStates;
use crate::storage::StorageService;

use super::error::{MigrateError, MigrateResult};
use super::{is_current, V1_NAMESPACE, V2_NAMESPACE, VERSION_2, VERSION_KEY};

/// Counts from one forward migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub topics: usize,
    pub events: usize,
    /// Events skipped because their ID was empty
    pub dropped_events: usize,
    /// True when the store was already at V2 and nothing ran
    pub skipped: bool,
}

/// Convert the V1 topic store into the V2 layout and mark the store as V2
///
/// Does nothing when the marker already says V2. Any existing V2 namespace
/// is discarded first, so a re-run after a failure starts from scratch.
/// This function does not protect the file; `migrate_topic_store` does.
pub fn migrate_v1_to_v2(service: &dyn StorageService) -> MigrateResult<ForwardStats> {
    let current = service.versions().get(VERSION_KEY).map_err(MigrateError::Version)?;
    if is_current(current.as_deref()) {
        debug!("topic store already at version 2");
        return Ok(ForwardStats {
            skipped: true,
            ..Default::default()
        });
    }

    if !service.store(V1_NAMESPACE).exists()? {
        return Err(MigrateError::MissingNamespace(V1_NAMESPACE.to_string()));
    }

    if service.store(V2_NAMESPACE).delete()? {
        debug!(namespace = V2_NAMESPACE, "discarded existing namespace");
    }

    let stats = service.store(V2_NAMESPACE).update(|tx| {
        let v1 = tx.namespace(V1_NAMESPACE)?;
        let mut stats = ForwardStats::default();

        for key in v1.keys()? {
            let topic = String::from_utf8_lossy(&key);
            let Some(blob) = v1.get(&key)? else {
                continue;
            };
            let bucket = tx.create_bucket_if_not_exists(&key)?;

            let mut events = 0;
            for item in EventStates::new(&blob) {
                let (id, raw) = item.map_err(|source| MigrateError::Malformed {
                    topic: topic.to_string(),
                    source,
                })?;
                if id.is_empty() {
                    warn!(topic = %topic, "dropping event state with empty ID");
                    stats.dropped_events += 1;
                    continue;
                }
                bucket.put(id.as_bytes(), raw)?;
                events += 1;
            }

            debug!(topic = %topic, events, "migrated topic");
            stats.topics += 1;
            stats.events += events;
        }
        Ok::<_, MigrateError>(stats)
    })?;

    service
        .versions()
        .set(VERSION_KEY, VERSION_2)
        .map_err(MigrateError::Version)?;

    info!(
        topics = stats.topics,
        events = stats.events,
        dropped = stats.dropped_events,
        "migrated topic store to version 2"
    );
    Ok(stats)
}
