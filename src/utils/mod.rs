//! Utility functions and helpers
//!
//! This module contains timestamp serialization and atomic file helpers.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_copy, cleanup_temp_files, remove_if_exists, sha256_file, temp_path};
pub use time::{epoch, format_rfc3339};
