//! Whole-file protection around the forward migration
//!
//! ```text
//! recover ──► version gate ──► backup ──► migrate_v1_to_v2 ──► remove backup
//!                  │                             │
//!                  └─► AlreadyCurrent            └─► restore backup ──► original error
//! ```
//!
//! The forward migration spans two namespaces and a version marker, each in
//! its own transaction. Copying the store file before the first write and
//! copying it back after any failure makes the whole sequence all or
//! nothing.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::storage::{StorageService, StoreError};
use crate::utils::atomic::{atomic_copy, cleanup_temp_files, remove_if_exists, sha256_file};

use super::error::{MigrateError, MigrateResult};
use super::forward::{migrate_v1_to_v2, ForwardStats};
use super::{is_current, VERSION_KEY};

/// Appended to the store path to name the backup file
pub const BACKUP_SUFFIX: &str = ".topic_store_backup";

/// Outcome of a guarded migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationReport {
    /// The marker already said V2; no backup was taken
    AlreadyCurrent,
    Migrated {
        stats: ForwardStats,
        /// False when the backup could not be deleted afterwards
        backup_removed: bool,
    },
}

/// Path of the backup taken for the store at `store`
pub fn backup_path(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Migrate the topic store to V2, leaving the file untouched on failure
///
/// On error the store file is byte-identical to what it was when this
/// function was called and no backup remains; the error of the failing step
/// is returned as is. Only if putting the backup back fails is the backup
/// kept, and `MigrateError::Restore` returned; the next call restores it.
pub fn migrate_topic_store(service: &dyn StorageService) -> MigrateResult<MigrationReport> {
    let store = service.path().to_path_buf();
    let backup = backup_path(&store);

    recover(service, &store, &backup)?;

    let current = service.versions().get(VERSION_KEY).map_err(MigrateError::Version)?;
    if is_current(current.as_deref()) {
        info!("topic store already at version 2");
        return Ok(MigrationReport::AlreadyCurrent);
    }

    let digest = take_backup(service, &backup)?;
    info!(backup = %backup.display(), sha256 = %digest, "backed up topic store");

    match migrate_v1_to_v2(service) {
        Ok(stats) => {
            let backup_removed = match remove_if_exists(&backup) {
                Ok(_) => true,
                Err(e) => {
                    warn!(backup = %backup.display(), error = %e, "failed to remove topic store backup");
                    false
                }
            };
            Ok(MigrationReport::Migrated {
                stats,
                backup_removed,
            })
        }
        Err(cause) => {
            warn!(error = %cause, "topic store migration failed, restoring backup");
            match restore(service, &backup, Some(&digest)) {
                Ok(()) => {
                    if let Err(e) = remove_if_exists(&backup) {
                        warn!(backup = %backup.display(), error = %e, "failed to remove topic store backup");
                    }
                    info!(store = %store.display(), "restored topic store from backup");
                    Err(cause)
                }
                Err(source) => {
                    error!(
                        backup = %backup.display(),
                        error = %source,
                        "failed to restore topic store; backup kept for the next attempt"
                    );
                    Err(MigrateError::Restore {
                        path: backup,
                        source,
                        cause: Box::new(cause),
                    })
                }
            }
        }
    }
}

/// Deal with a backup left behind by an earlier attempt
///
/// A completed migration sets the marker last, so a V2 marker means the
/// backup is stale. Anything else means the attempt died part way and the
/// backup is put back.
fn recover(service: &dyn StorageService, store: &Path, backup: &Path) -> MigrateResult<()> {
    let cleaned = cleanup_temp_files(&[store, backup]).map_err(|source| MigrateError::Backup {
        path: backup.to_path_buf(),
        source,
    })?;
    if cleaned > 0 {
        warn!(files = cleaned, "removed temporary files of an interrupted copy");
    }

    if !backup.exists() {
        return Ok(());
    }

    let completed = match service.versions().get(VERSION_KEY) {
        Ok(version) => is_current(version.as_deref()),
        Err(e) => {
            warn!(error = %e, "cannot read topic store version, restoring backup");
            false
        }
    };

    if !completed {
        warn!(backup = %backup.display(), "found backup of an interrupted migration, restoring it");
        restore(service, backup, None).map_err(|source| MigrateError::Recover {
            path: backup.to_path_buf(),
            source,
        })?;
    } else {
        warn!(backup = %backup.display(), "removing backup of a completed migration");
    }

    remove_if_exists(backup).map_err(|source| MigrateError::Backup {
        path: backup.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn take_backup(service: &dyn StorageService, backup: &Path) -> MigrateResult<String> {
    let mut digest = String::new();
    let result = service.with_file_detached(&mut |store| {
        digest = atomic_copy(store, backup)?;
        Ok(())
    });
    let err = match result {
        Ok(()) => return Ok(digest),
        Err(StoreError::Io(source)) => MigrateError::Backup {
            path: backup.to_path_buf(),
            source,
        },
        Err(e) => MigrateError::Store(e),
    };

    // A backup that cannot be relied on must not outlive this call.
    if let Err(e) = remove_if_exists(backup) {
        warn!(backup = %backup.display(), error = %e, "failed to remove topic store backup");
    }
    Err(err)
}

/// Copy `backup` over the store, checking the result against `expected`
fn restore(service: &dyn StorageService, backup: &Path, expected: Option<&str>) -> io::Result<()> {
    let result = service.with_file_detached(&mut |store| {
        atomic_copy(backup, store)?;
        let restored = sha256_file(store)?;
        match expected {
            Some(expected) if expected != restored => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("restored file has SHA-256 {}, backup had {}", restored, expected),
            )),
            _ => Ok(()),
        }
    });
    match result {
        Ok(()) => Ok(()),
        Err(StoreError::Io(e)) => Err(e),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
    }
}
