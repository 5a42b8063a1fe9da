//! Atomic file operations
//!
//! Whole-file copies used to back up and restore the store file.
//!
//! # Pattern
//!
//! 1. Copy into a temporary file (`<dest>.tmp`)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path (atomic on most filesystems)
//!
//! The destination is therefore either its old content or a complete copy,
//! never a partial one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const TEMP_SUFFIX: &str = ".tmp";
const CHUNK: usize = 64 * 1024;

/// Temporary path used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomically copy `from` to `to`, returning the hex SHA-256 of the bytes copied
pub fn atomic_copy<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<String> {
    let from = from.as_ref();
    let to = to.as_ref();
    let temp = temp_path(to);

    let mut src = File::open(from)?;
    let mut dst = File::create(&temp)?;
    let digest = match copy_hashing(&mut src, &mut dst).and_then(|d| dst.sync_all().map(|_| d)) {
        Ok(digest) => digest,
        Err(e) => {
            drop(dst);
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
    };
    drop(dst);

    fs::rename(&temp, to)?;
    sync_parent(to);
    Ok(digest)
}

/// Hex SHA-256 of a file's content
pub fn sha256_file<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path)?;
    copy_hashing(&mut file, &mut io::sink())
}

/// Remove a file, treating "not found" as success
///
/// Returns whether a file was removed.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Clean up temp files left by interrupted copies onto `paths`
///
/// Call this before touching `paths` again after a crash.
pub fn cleanup_temp_files<P: AsRef<Path>>(paths: &[P]) -> io::Result<usize> {
    let mut cleaned = 0;
    for path in paths {
        if remove_if_exists(temp_path(path.as_ref()))? {
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

fn copy_hashing<R: Read, W: Write>(src: &mut R, dst: &mut W) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        dst.write_all(&buf[..n])?;
    }
    dst.flush()?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
