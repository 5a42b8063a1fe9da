//! Topic state: a topic name and its event states

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::EventState;

/// All event states of one topic, keyed by event ID
///
/// A `BTreeMap` keeps serialization order equal to the store's key order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicState {
    pub topic: String,
    #[serde(rename = "event-states", default)]
    pub event_states: BTreeMap<String, EventState>,
}

impl TopicState {
    /// Create an empty topic state
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event_states: BTreeMap::new(),
        }
    }

    /// Create a topic state with the given events
    pub fn with_events(topic: impl Into<String>, event_states: BTreeMap<String, EventState>) -> Self {
        Self {
            topic: topic.into(),
            event_states,
        }
    }

    /// Number of event states
    pub fn len(&self) -> usize {
        self.event_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_states.is_empty()
    }

    /// IDs that cannot be stored as V2 bucket keys
    pub fn malformed_ids(&self) -> usize {
        self.event_states.keys().filter(|id| id.is_empty()).count()
    }
}
