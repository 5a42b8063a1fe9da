//! Storage configuration

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the store file
pub const PATH_ENV: &str = "TOPIC_STORE_PATH";

/// Environment variable for the SQLite busy timeout in milliseconds
pub const BUSY_TIMEOUT_ENV: &str = "TOPIC_STORE_BUSY_TIMEOUT_MS";

/// Configuration for the Database
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the single store file
    pub path: PathBuf,
    /// How long a transaction waits for a competing lock
    pub busy_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("topic_store.db"),
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

impl StorageConfig {
    /// Create config for a store file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Build config from the environment, falling back to defaults
    ///
    /// A relative `TOPIC_STORE_PATH` is resolved against the current directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var(PATH_ENV) {
            config.path = resolve(PathBuf::from(path));
        } else {
            config.path = resolve(config.path);
        }

        if let Some(ms) = env::var(BUSY_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.busy_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Set the busy timeout (builder style)
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a sibling file: the store path with `suffix` appended
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

fn resolve(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    env::current_dir()
        .map(|dir| dir.join(&path))
        .unwrap_or(path)
}
