//! Topic Store Module: versioned layouts of alert topic state
//!
//! Topic state has two on-disk layouts:
//! - V1 (`alert_store`): one key per topic, value is a versioned envelope
//!   holding every event state of the topic
//! - V2 (`topic_states_store`): one bucket per topic, one key per event ID,
//!   value is the bare event state
//!
//! The `topic_store_version` key of the `versions` namespace says which
//! layout is live: absent or empty for V1, `"2"` for V2.
//!
//! # Migration
//!
//! ```text
//! Forward (guarded):
//! ┌─────────┐    ┌──────────────┐    ┌──────────────────┐    ┌────────────┐
//! │ recover │───►│ backup file  │───►│ migrate_v1_to_v2 │───►│ set marker │
//! └─────────┘    └──────────────┘    └──────────────────┘    └────────────┘
//!                        ▲                   │ error                │ error
//!                        └───── restore ◄────┴──────────────────────┘
//!
//! Reverse:
//! ┌──────────────────┐    ┌───────────────────────────┐
//! │ walk V2 buckets  │───►│ write one envelope / topic│
//! └──────────────────┘    └───────────────────────────┘
//! ```

mod dao;
mod error;
mod forward;
mod guard;
mod reverse;
mod walk;

pub use dao::{delete_v2_topic_store, TopicBuckets, TopicStateKv};
pub use error::{MigrateError, MigrateResult};
pub use forward::{migrate_v1_to_v2, ForwardStats};
pub use guard::{backup_path, migrate_topic_store, MigrationReport, BACKUP_SUFFIX};
pub use reverse::{migrate_v2_to_v1, ReverseStats};
pub use walk::{walk_topic_buckets, walk_topic_buckets_in};

/// Namespace of the V1 layout
pub const V1_NAMESPACE: &str = "alert_store";

/// Namespace of the V2 layout
pub const V2_NAMESPACE: &str = "topic_states_store";

/// Key of the version marker in the `versions` namespace
pub const VERSION_KEY: &str = "topic_store_version";

/// Marker value of the V2 layout
pub const VERSION_2: &str = "2";

/// Whether a marker value names the V2 layout
pub fn is_current(version: Option<&str>) -> bool {
    version == Some(VERSION_2)
}

