//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::storage::{Database, StorageConfig, StoreError, StoreResult, Versions};
use crate::topic_store::{
    migrate_topic_store, migrate_v2_to_v1, walk_topic_buckets, MigrateResult, MigrationReport,
    TopicStateKv, V2_NAMESPACE, VERSION_KEY,
};

/// Inspect and migrate the alert topic store
#[derive(Parser, Debug)]
#[command(name = "topic-store", version, about, long_about = None)]
pub struct Cli {
    /// Path to the store file [default: $TOPIC_STORE_PATH, then topic_store.db]
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// How long to wait for a locked store, in milliseconds
    /// [default: $TOPIC_STORE_BUSY_TIMEOUT_MS, then 5000]
    #[arg(long, global = true)]
    pub busy_timeout_ms: Option<u64>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Migrate the topic store to version 2 (backup protected)
    Migrate,
    /// Rebuild the version 1 topic store from version 2
    Downgrade {
        /// Also clear the version marker so the next start migrates again
        #[arg(long)]
        reset_version: bool,
    },
    /// Print the topic store version
    Version,
    /// Print the version and the size of both layouts
    Status,
}

impl Cli {
    /// Environment settings with the command-line flags applied on top
    pub fn storage_config(&self) -> StorageConfig {
        let mut config = StorageConfig::from_env();
        if let Some(db) = &self.db {
            config.path = db.clone();
        }
        match self.busy_timeout_ms {
            Some(ms) => config.with_busy_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

/// Set while a command rewrites the store
static BUSY: AtomicBool = AtomicBool::new(false);
/// Set when Ctrl+C arrived while `BUSY`
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Exit code after an interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Defer Ctrl+C / SIGTERM until a running migration has finished
///
/// Outside a migration the process exits at once.
pub fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if BUSY.load(Ordering::SeqCst) {
            INTERRUPTED.store(true, Ordering::SeqCst);
            warn!("interrupt received, exiting once the migration has finished");
        } else {
            std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
        }
    });
    if let Err(e) = result {
        warn!(error = %e, "cannot install interrupt handler");
    }
}

/// Whether an interrupt was deferred during the last command
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

struct BusyGuard;

impl BusyGuard {
    fn enter() -> Self {
        BUSY.store(true, Ordering::SeqCst);
        BusyGuard
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        BUSY.store(false, Ordering::SeqCst);
    }
}

/// Run one command against the store
pub fn run(cli: &Cli) -> MigrateResult<()> {
    let db = Database::open(cli.storage_config())?;
    let _busy = matches!(cli.command, Command::Migrate | Command::Downgrade { .. }).then(BusyGuard::enter);

    match &cli.command {
        Command::Migrate => match migrate_topic_store(&db)? {
            MigrationReport::AlreadyCurrent => println!("topic store already at version 2"),
            MigrationReport::Migrated {
                stats,
                backup_removed,
            } => {
                println!(
                    "migrated {} topics, {} events ({} dropped)",
                    stats.topics, stats.events, stats.dropped_events
                );
                if !backup_removed {
                    println!("warning: backup file was left in place");
                }
            }
        },
        Command::Downgrade { reset_version } => {
            let stats = migrate_v2_to_v1(&db)?;
            if *reset_version {
                db.versions().set(VERSION_KEY, "")?;
                info!("cleared topic store version");
            }
            println!("downgraded {} topics, {} events", stats.topics, stats.events);
        }
        Command::Version => println!("{}", marker(&db)?),
        Command::Status => {
            println!("version: {}", marker(&db)?);

            let v1 = TopicStateKv::new(&db).list()?;
            let v1_events: usize = v1.iter().map(|ts| ts.len()).sum();
            println!("v1: {} topics, {} events", v1.len(), v1_events);

            let (v2_topics, v2_events) = v2_counts(&db)?;
            println!("v2: {} topics, {} events", v2_topics, v2_events);
        }
    }

    db.close()?;
    Ok(())
}

/// The marker, or `1` when it was never set
fn marker(db: &Database) -> StoreResult<String> {
    Ok(match db.versions().get(VERSION_KEY)? {
        Some(v) if !v.is_empty() => v,
        _ => "1".to_string(),
    })
}

fn v2_counts(db: &Database) -> StoreResult<(usize, usize)> {
    let mut topics = 0;
    let mut events = 0;
    walk_topic_buckets::<StoreError, _>(&db.store(V2_NAMESPACE), |tx, topic| {
        topics += 1;
        if let Some(bucket) = tx.bucket(topic)? {
            events += bucket.len()?;
        }
        Ok(())
    })?;
    Ok((topics, events))
}
