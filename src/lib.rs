//! Topic Store
//!
//! Persistence core for alert topic state: an embedded transactional
//! key-value store with named namespaces, and the versioned schema migration
//! that moves topic state between its two on-disk layouts.
//!
//! # Features
//!
//! - **Streaming transcoding**: Events move between layouts as raw bytes,
//!   never decoded one structure at a time
//! - **Crash-safe migration**: Whole-file backup, byte-exact restore on
//!   any failure, recovery of interrupted attempts
//! - **Both directions**: V1 → V2 guarded and idempotent, V2 → V1 for
//!   downgrades
//! - **Nested buckets**: Ordered, bbolt-style buckets on a single SQLite file
//!
//! # Modules
//!
//! - `types`: Core data structures (EventState, Level, TopicState)
//! - `codec`: Record and envelope encoding, streaming extraction
//! - `storage`: Database, namespaces, transactions, version markers
//! - `topic_store`: Migrators, bucket walker, backup/restore guard, DAOs
//! - `utils`: Time serialization and atomic file copies
//!
//! # Example
//!
//! ```no_run
//! use topic_store::storage::{Database, StorageConfig};
//! use topic_store::topic_store::{migrate_topic_store, MigrationReport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open(StorageConfig::from_env())?;
//!     match migrate_topic_store(&db)? {
//!         MigrationReport::AlreadyCurrent => println!("nothing to do"),
//!         MigrationReport::Migrated { stats, .. } => println!("{} topics", stats.topics),
//!     }
//!     db.close()?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod logging;
pub mod storage;
pub mod topic_store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use codec::{CodecError, EnvelopeWriter, EventStates};
pub use storage::{Database, Namespace, StorageConfig, StorageService, StoreError, Versions};
pub use topic_store::{
    migrate_topic_store, migrate_v1_to_v2, migrate_v2_to_v1, MigrateError, MigrationReport,
};
pub use types::{EventState, Level, TopicState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Binary name
pub const NAME: &str = "topic-store";
