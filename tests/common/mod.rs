//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use topic_store::storage::{Database, Namespace, StorageConfig, StorageService, StoreError, StoreResult, Versions};
use topic_store::types::{EventState, Level, TopicState};

const WORDS: &[&str] = &[
    "disk", "cpu", "load", "high", "low", "critical", "recovered", "host", "eu-west", "latency",
    "p99", "errors", "timeout", "\"quoted\"", "ünïcödé", "tab\there", "line\nbreak", "slash/\\",
];

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A fresh store in its own temp directory
pub fn open_store() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(StorageConfig::new(dir.path().join("topic_store.db"))).unwrap();
    (dir, db)
}

pub fn words(rng: &mut StdRng, n: usize) -> String {
    (0..n)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Any instant between 2001 and 2033 at a whole-minute offset, with nanoseconds
pub fn random_time(rng: &mut StdRng) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(rng.gen_range(-720..=840) * 60).unwrap();
    let secs = rng.gen_range(1_000_000_000i64..2_000_000_000);
    let nanos = rng.gen_range(0..1_000_000_000u32);
    offset.timestamp_opt(secs, nanos).unwrap()
}

pub fn random_event(rng: &mut StdRng, message_words: usize, details_words: usize) -> EventState {
    let level = Level::ALL[rng.gen_range(0..Level::ALL.len())];
    EventState::new(level, random_time(rng))
        .with_message(words(rng, message_words))
        .with_details(words(rng, details_words))
        .with_duration(Duration::nanoseconds(rng.gen_range(-5_000_000_000i64..500_000_000_000)))
}

/// `n` event states keyed `<prefix>-<i>`
pub fn make_event_states(
    rng: &mut StdRng,
    prefix: &str,
    n: usize,
    message_words: usize,
    details_words: usize,
) -> BTreeMap<String, EventState> {
    (0..n)
        .map(|i| {
            (
                format!("{}-{:04}", prefix, i),
                random_event(rng, message_words, details_words),
            )
        })
        .collect()
}

pub fn make_topic(rng: &mut StdRng, topic: &str, n: usize) -> TopicState {
    TopicState::with_events(topic, make_event_states(rng, topic, n, 4, 8))
}

/// Every value of a namespace's top-level keys
pub fn namespace_values(ns: &Namespace) -> BTreeMap<Vec<u8>, Vec<u8>> {
    ns.view(|tx| -> StoreResult<_> {
        let mut out = BTreeMap::new();
        tx.for_each(|k, v| -> StoreResult<()> {
            out.insert(k.to_vec(), v.to_vec());
            Ok(())
        })?;
        Ok(out)
    })
    .unwrap()
}

pub fn assert_same_events(got: &BTreeMap<String, EventState>, want: &BTreeMap<String, EventState>) {
    assert_eq!(
        got.keys().collect::<Vec<_>>(),
        want.keys().collect::<Vec<_>>(),
        "event IDs differ"
    );
    for (id, es) in want {
        assert!(got[id].same_as(es), "event {:?} differs: {:?} != {:?}", id, got[id], es);
    }
}

/// Marker of the injected version failure
#[derive(Debug)]
pub struct VersionSetFailure;

impl fmt::Display for VersionSetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected version set failure")
    }
}

impl std::error::Error for VersionSetFailure {}

/// `Versions` whose `set` fails on its `fail_on`-th call
pub struct FailingVersions<'a> {
    inner: &'a dyn Versions,
    fail_on: usize,
    calls: AtomicUsize,
}

impl Versions for FailingVersions<'_> {
    fn get(&self, id: &str) -> StoreResult<Option<String>> {
        self.inner.get(id)
    }

    fn set(&self, id: &str, version: &str) -> StoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, VersionSetFailure)));
        }
        self.inner.set(id, version)
    }
}

/// What goes wrong on an injected detached-file call
#[derive(Clone, Copy)]
pub enum DetachFault {
    /// Fail before the file is touched
    Fail,
    /// Run the file operation, then fail the way a reopen would
    FailAfter,
    /// Run the file operation, then `hook` with the store path
    Then(fn(&Path) -> io::Result<()>),
}

/// Marker of an injected detached-file failure
#[derive(Debug)]
pub struct DetachFailure;

impl fmt::Display for DetachFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected detached file failure")
    }
}

impl std::error::Error for DetachFailure {}

/// A store whose version marker and file operations fail on demand
pub struct FailingService<'a> {
    db: &'a Database,
    versions: FailingVersions<'a>,
    detach_calls: AtomicUsize,
    detach_fault: Option<(usize, DetachFault)>,
}

impl<'a> FailingService<'a> {
    /// Fail the `fail_on`-th version `set`; 0 never fails
    pub fn new(db: &'a Database, fail_on: usize) -> Self {
        Self {
            db,
            versions: FailingVersions {
                inner: db.versions(),
                fail_on,
                calls: AtomicUsize::new(0),
            },
            detach_calls: AtomicUsize::new(0),
            detach_fault: None,
        }
    }

    /// Also inject `fault` into the `call`-th `with_file_detached`
    pub fn with_detach_fault(mut self, call: usize, fault: DetachFault) -> Self {
        self.detach_fault = Some((call, fault));
        self
    }

    pub fn set_calls(&self) -> usize {
        self.versions.calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }
}

impl StorageService for FailingService<'_> {
    fn store(&self, namespace: &str) -> Namespace {
        self.db.store(namespace)
    }

    fn versions(&self) -> &dyn Versions {
        &self.versions
    }

    fn path(&self) -> &Path {
        self.db.path()
    }

    fn with_file_detached(&self, f: &mut dyn FnMut(&Path) -> io::Result<()>) -> StoreResult<()> {
        let call = self.detach_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fault = match self.detach_fault {
            Some((on, fault)) if on == call => fault,
            _ => return self.db.with_file_detached(f),
        };

        match fault {
            DetachFault::Fail => Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, DetachFailure))),
            DetachFault::FailAfter => {
                self.db.with_file_detached(f)?;
                Err(StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
            }
            DetachFault::Then(hook) => self.db.with_file_detached(|path| {
                f(path)?;
                hook(path)
            }),
        }
    }
}
