//! Event state records

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use super::Level;
use crate::utils::time::{self, epoch, is_zero_duration};

/// Last known status of one alerting condition within a topic
///
/// The event ID is not part of the record; it is the key the record is
/// stored under (a map key in V1, a bucket key in V2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default = "epoch", with = "time::rfc3339")]
    pub time: DateTime<FixedOffset>,
    #[serde(default = "Duration::zero", with = "time::nanos", skip_serializing_if = "is_zero_duration")]
    pub duration: Duration,
    #[serde(default)]
    pub level: Level,
}

impl EventState {
    /// Create an event state at the given level and time
    pub fn new(level: Level, time: DateTime<FixedOffset>) -> Self {
        Self {
            level,
            time,
            ..Default::default()
        }
    }

    /// Set the message (builder style)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the details (builder style)
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Set the duration (builder style)
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Field-by-field comparison that also requires identical UTC offsets
    ///
    /// `DateTime` equality only compares instants.
    pub fn same_as(&self, other: &EventState) -> bool {
        self == other && self.time.offset() == other.time.offset()
    }
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            message: String::new(),
            details: String::new(),
            time: epoch(),
            duration: Duration::zero(),
            level: Level::Ok,
        }
    }
}
