//! Record access for both topic store layouts
//!
//! `TopicStateKv` reads and writes V1 envelopes (one key per topic) and
//! `TopicBuckets` reads and writes V2 buckets (one bucket per topic, one
//! key per event).

use std::collections::BTreeMap;

use crate::codec::{decode_event_state, decode_topic_state, encode_event_state, encode_topic_state};
use crate::storage::{Namespace, StorageService, StoreError, StoreResult};
use crate::types::{EventState, TopicState};

use super::error::{MigrateError, MigrateResult};
use super::{V1_NAMESPACE, V2_NAMESPACE};

/// V1 topic states, one envelope per topic
#[derive(Clone)]
pub struct TopicStateKv {
    ns: Namespace,
}

impl TopicStateKv {
    pub fn new(service: &dyn StorageService) -> Self {
        Self {
            ns: service.store(V1_NAMESPACE),
        }
    }

    /// Store a topic state, replacing any previous one
    pub fn put(&self, ts: &TopicState) -> MigrateResult<()> {
        let blob = encode_topic_state(ts).map_err(|source| MigrateError::Malformed {
            topic: ts.topic.clone(),
            source,
        })?;
        Ok(self.ns.update(|tx| tx.put(ts.topic.as_bytes(), &blob))?)
    }

    pub fn get(&self, topic: &str) -> MigrateResult<Option<TopicState>> {
        let blob = self.ns.view(|tx| tx.get(topic.as_bytes()))?;
        blob.map(|b| decode(topic, &b)).transpose()
    }

    /// Every topic state in topic order
    pub fn list(&self) -> MigrateResult<Vec<TopicState>> {
        self.ns.view(|tx| {
            let mut states = Vec::new();
            tx.for_each(|key, value| {
                states.push(decode(&String::from_utf8_lossy(key), value)?);
                Ok::<_, MigrateError>(())
            })?;
            Ok(states)
        })
    }

    /// Topic names in order
    pub fn topics(&self) -> StoreResult<Vec<String>> {
        let keys = self.ns.view(|tx| tx.keys())?;
        Ok(keys
            .iter()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect())
    }

    pub fn delete(&self, topic: &str) -> StoreResult<()> {
        self.ns.update(|tx| tx.delete(topic.as_bytes()))
    }
}

fn decode(topic: &str, blob: &[u8]) -> MigrateResult<TopicState> {
    decode_topic_state(blob).map_err(|source| MigrateError::Malformed {
        topic: topic.to_string(),
        source,
    })
}

/// V2 topic states, one bucket per topic
#[derive(Clone)]
pub struct TopicBuckets {
    ns: Namespace,
}

impl TopicBuckets {
    pub fn new(service: &dyn StorageService) -> Self {
        Self {
            ns: service.store(V2_NAMESPACE),
        }
    }

    /// Decode every event state of `topic`; an unknown topic has none
    pub fn load_topic_bucket(&self, topic: &str) -> MigrateResult<BTreeMap<String, EventState>> {
        self.ns.view(|tx| {
            let mut events = BTreeMap::new();
            let Some(bucket) = tx.bucket(topic.as_bytes())? else {
                return Ok(events);
            };
            bucket.for_each(|id, raw| {
                let es = decode_event_state(raw).map_err(|source| MigrateError::Malformed {
                    topic: topic.to_string(),
                    source,
                })?;
                events.insert(String::from_utf8_lossy(id).into_owned(), es);
                Ok::<_, MigrateError>(())
            })?;
            Ok(events)
        })
    }

    /// Store one event state, creating the topic bucket if needed
    pub fn put_event_state(&self, topic: &str, id: &str, es: &EventState) -> MigrateResult<()> {
        let raw = encode_event_state(es).map_err(|source| MigrateError::Malformed {
            topic: topic.to_string(),
            source,
        })?;
        Ok(self.ns.update(|tx| {
            tx.create_bucket_if_not_exists(topic.as_bytes())?
                .put(id.as_bytes(), &raw)
        })?)
    }

    /// Remove one event state; missing topics and events are ignored
    pub fn delete_event_state(&self, topic: &str, id: &str) -> StoreResult<()> {
        self.ns.update(|tx| match tx.bucket(topic.as_bytes())? {
            Some(bucket) => bucket.delete(id.as_bytes()),
            None => Ok(()),
        })
    }

    /// Remove a topic bucket and all its event states
    pub fn delete_topic(&self, topic: &str) -> StoreResult<()> {
        self.ns.update(|tx| match tx.delete_bucket(topic.as_bytes()) {
            Err(StoreError::BucketNotFound(_)) => Ok(()),
            other => other,
        })
    }

    /// Topic names in order
    pub fn topics(&self) -> StoreResult<Vec<String>> {
        let names = self.ns.view(|tx| tx.bucket_names())?;
        Ok(names
            .iter()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect())
    }
}

/// Drop the whole V2 namespace; returns whether it existed
pub fn delete_v2_topic_store(service: &dyn StorageService) -> StoreResult<bool> {
    service.store(V2_NAMESPACE).delete()
}
