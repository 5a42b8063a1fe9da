//! Topic Store Migration Integration Tests
//!
//! Tests for the complete migration flow including:
//! - V1 → V2 → V1 round trips
//! - Idempotence and version marker handling
//! - Byte-exact restoration after failures
//! - Recovery of interrupted attempts

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use topic_store::storage::{Database, StorageService, StoreError, Versions};
use topic_store::topic_store::{
    backup_path, migrate_topic_store, migrate_v2_to_v1, MigrateError, MigrationReport, TopicBuckets,
    TopicStateKv, V1_NAMESPACE, V2_NAMESPACE, VERSION_2, VERSION_KEY,
};
use topic_store::types::{EventState, TopicState};
use topic_store::utils::sha256_file;

use common::{
    assert_same_events, make_topic, namespace_values, open_store, random_event, rng,
    DetachFailure, DetachFault, FailingService, VersionSetFailure,
};

fn seed_v1(db: &Database, topics: &[TopicState]) {
    let kv = TopicStateKv::new(db);
    for ts in topics {
        kv.put(ts).unwrap();
    }
}

fn fixture(seed: u64) -> Vec<TopicState> {
    let mut rng = rng(seed);
    vec![
        make_topic(&mut rng, "cpu", 12),
        make_topic(&mut rng, "disk:/var", 3),
        make_topic(&mut rng, "idle", 0),
        make_topic(&mut rng, "mem \"quoted\"", 7),
    ]
}

fn file_hash(db: &Database) -> String {
    sha256_file(db.path()).unwrap()
}

#[test]
fn test_round_trip_restores_identical_v1_bytes() {
    let (_dir, db) = open_store();
    let topics = fixture(1);
    seed_v1(&db, &topics);
    let v1_before = namespace_values(&db.store(V1_NAMESPACE));

    let report = migrate_topic_store(&db).unwrap();
    match report {
        MigrationReport::Migrated {
            stats,
            backup_removed,
        } => {
            assert_eq!(stats.topics, 4);
            assert_eq!(stats.events, 22);
            assert_eq!(stats.dropped_events, 0);
            assert!(backup_removed);
        }
        other => panic!("unexpected report {:?}", other),
    }

    let v2 = TopicBuckets::new(&db);
    assert_eq!(v2.topics().unwrap(), vec!["cpu", "disk:/var", "idle", "mem \"quoted\""]);
    for ts in &topics {
        assert_same_events(&v2.load_topic_bucket(&ts.topic).unwrap(), &ts.event_states);
    }

    // Wipe V1 so the reverse migration has to rebuild every envelope.
    assert!(db.delete_namespace(V1_NAMESPACE).unwrap());
    let stats = migrate_v2_to_v1(&db).unwrap();
    assert_eq!(stats.topics, 4);
    assert_eq!(stats.events, 22);

    assert_eq!(namespace_values(&db.store(V1_NAMESPACE)), v1_before);
    for ts in &topics {
        let back = TopicStateKv::new(&db).get(&ts.topic).unwrap().unwrap();
        assert_eq!(back.topic, ts.topic);
        assert_same_events(&back.event_states, &ts.event_states);
    }
}

#[test]
fn test_second_migration_is_a_no_op() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(2));

    assert!(matches!(
        migrate_topic_store(&db).unwrap(),
        MigrationReport::Migrated { .. }
    ));
    let v2_after_first = namespace_values(&db.store(V2_NAMESPACE));
    let hash = file_hash(&db);

    assert_eq!(migrate_topic_store(&db).unwrap(), MigrationReport::AlreadyCurrent);
    assert_eq!(file_hash(&db), hash);
    assert_eq!(namespace_values(&db.store(V2_NAMESPACE)), v2_after_first);
    assert_eq!(db.versions().get(VERSION_KEY).unwrap().as_deref(), Some(VERSION_2));
    assert!(!backup_path(db.path()).exists());
}

fn is_injected<T: std::error::Error + 'static>(e: &io::Error) -> bool {
    e.get_ref()
        .and_then(|inner| inner.downcast_ref::<T>())
        .is_some()
}

#[test]
fn test_version_failure_restores_file_exactly() {
    for fail_on in 1..=3 {
        let (_dir, db) = open_store();
        seed_v1(&db, &fixture(3));

        // Earlier marker writes use up the calls before the failing one.
        let service = FailingService::new(&db, fail_on);
        for i in 1..fail_on {
            service.versions().set(&format!("other-{}", i), "x").unwrap();
        }
        let before = file_hash(&db);

        let err = migrate_topic_store(&service).unwrap_err();
        match &err {
            MigrateError::Version(StoreError::Io(e)) => {
                assert!(is_injected::<VersionSetFailure>(e), "unexpected cause {:?}", e);
            }
            other => panic!("expected a version error, got {:?}", other),
        }
        assert_eq!(service.set_calls(), fail_on);

        assert_eq!(file_hash(&db), before, "fail_on = {}", fail_on);
        assert!(!backup_path(db.path()).exists());
        assert_eq!(db.versions().get(VERSION_KEY).unwrap(), None);
        assert!(!db.store(V2_NAMESPACE).exists().unwrap());

        // The store is usable and a later attempt goes through.
        assert!(matches!(
            migrate_topic_store(&db).unwrap(),
            MigrationReport::Migrated { .. }
        ));
    }
}

#[test]
fn test_backup_failure_leaves_store_untouched() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(13));
    let before = file_hash(&db);

    let service = FailingService::new(&db, 0).with_detach_fault(1, DetachFault::Fail);
    let err = migrate_topic_store(&service).unwrap_err();

    match &err {
        MigrateError::Backup { path, source } => {
            assert_eq!(path, &backup_path(db.path()));
            assert!(is_injected::<DetachFailure>(source), "unexpected cause {:?}", source);
        }
        other => panic!("expected a backup error, got {:?}", other),
    }
    assert_eq!(service.detach_calls(), 1);
    assert_eq!(service.set_calls(), 0);
    assert_eq!(file_hash(&db), before);
    assert!(!backup_path(db.path()).exists());
    assert!(!db.store(V2_NAMESPACE).exists().unwrap());
}

#[test]
fn test_backup_removed_when_reattach_fails() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(14));
    let before = file_hash(&db);

    let service = FailingService::new(&db, 0).with_detach_fault(1, DetachFault::FailAfter);
    let err = migrate_topic_store(&service).unwrap_err();

    assert!(matches!(err, MigrateError::Store(StoreError::Sql(_))), "unexpected error {:?}", err);
    assert!(!backup_path(db.path()).exists());
    assert_eq!(file_hash(&db), before);

    assert!(matches!(
        migrate_topic_store(&db).unwrap(),
        MigrationReport::Migrated { .. }
    ));
}

#[test]
fn test_restore_failure_keeps_backup_for_next_attempt() {
    let (_dir, db) = open_store();
    let topics = fixture(15);
    seed_v1(&db, &topics);
    let before = file_hash(&db);
    let backup = backup_path(db.path());

    // The marker write fails, then so does putting the backup back.
    let service = FailingService::new(&db, 1).with_detach_fault(2, DetachFault::Fail);
    let err = migrate_topic_store(&service).unwrap_err();

    match &err {
        MigrateError::Restore { path, source, .. } => {
            assert_eq!(path, &backup);
            assert!(is_injected::<DetachFailure>(source), "unexpected cause {:?}", source);
        }
        other => panic!("expected a restore error, got {:?}", other),
    }
    assert!(matches!(err.root_cause(), MigrateError::Version(_)));
    assert_eq!(service.detach_calls(), 2);
    assert_eq!(sha256_file(&backup).unwrap(), before);
    // The half-migrated store is still in place.
    assert!(db.store(V2_NAMESPACE).exists().unwrap());

    // The next call restores the backup before migrating again.
    assert!(matches!(
        migrate_topic_store(&db).unwrap(),
        MigrationReport::Migrated {
            backup_removed: true,
            ..
        }
    ));
    assert!(!backup.exists());
    let v2 = TopicBuckets::new(&db);
    for ts in &topics {
        assert_same_events(&v2.load_topic_bucket(&ts.topic).unwrap(), &ts.event_states);
    }
}

/// Swap the fresh backup for a directory that `remove_file` cannot delete
fn pin_backup(store: &Path) -> io::Result<()> {
    let backup = backup_path(store);
    fs::remove_file(&backup)?;
    fs::create_dir(&backup)?;
    fs::write(backup.join("pinned"), b"")
}

#[test]
fn test_backup_removal_failure_still_succeeds() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(16));

    let service = FailingService::new(&db, 0).with_detach_fault(1, DetachFault::Then(pin_backup));
    let report = migrate_topic_store(&service).unwrap();

    match report {
        MigrationReport::Migrated {
            stats,
            backup_removed,
        } => {
            assert_eq!(stats.topics, 4);
            assert!(!backup_removed);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert_eq!(db.versions().get(VERSION_KEY).unwrap().as_deref(), Some(VERSION_2));
    assert!(backup_path(db.path()).is_dir());

    fs::remove_dir_all(backup_path(db.path())).unwrap();
    assert_eq!(migrate_topic_store(&db).unwrap(), MigrationReport::AlreadyCurrent);
}

#[test]
fn test_empty_event_id_is_dropped() {
    let (_dir, db) = open_store();
    let mut rng = rng(4);
    let mut events = BTreeMap::new();
    events.insert(String::new(), random_event(&mut rng, 2, 2));
    events.insert("valid".to_string(), random_event(&mut rng, 2, 2));
    let ts = TopicState::with_events("t", events);
    assert_eq!(ts.malformed_ids(), 1);
    seed_v1(&db, &[ts.clone()]);

    match migrate_topic_store(&db).unwrap() {
        MigrationReport::Migrated { stats, .. } => {
            assert_eq!(stats.events, 1);
            assert_eq!(stats.dropped_events, 1);
        }
        other => panic!("unexpected report {:?}", other),
    }

    let v2 = TopicBuckets::new(&db).load_topic_bucket("t").unwrap();
    assert_eq!(v2.len(), 1);
    assert!(v2["valid"].same_as(&ts.event_states["valid"]));
}

#[test]
fn test_multi_topic_sizes() {
    let (_dir, db) = open_store();
    let mut rng = rng(5);
    let topics: Vec<TopicState> = [50, 100, 130, 300]
        .iter()
        .map(|&n| make_topic(&mut rng, &format!("topic-{}", n), n))
        .collect();
    seed_v1(&db, &topics);

    migrate_topic_store(&db).unwrap();

    let v2 = TopicBuckets::new(&db);
    for ts in &topics {
        let got = v2.load_topic_bucket(&ts.topic).unwrap();
        assert_eq!(got.len(), ts.len());
        assert_same_events(&got, &ts.event_states);
    }
}

#[test]
fn test_version_marker_is_observable() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(6));

    assert_eq!(db.versions().get(VERSION_KEY).unwrap(), None);
    migrate_topic_store(&db).unwrap();
    assert_eq!(db.versions().get(VERSION_KEY).unwrap().as_deref(), Some("2"));
}

#[test]
fn test_empty_marker_counts_as_v1() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(7));
    db.versions().set(VERSION_KEY, "").unwrap();

    assert!(matches!(
        migrate_topic_store(&db).unwrap(),
        MigrationReport::Migrated { .. }
    ));
}

#[test]
fn test_malformed_envelope_leaves_file_untouched() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(8));
    db.store(V1_NAMESPACE)
        .update(|tx| tx.put(b"zz-broken", br#"{"version":1,"value":{"topic":"zz-broken","event-states":{"a":{"level":"OK"},}}}"#))
        .unwrap();
    let before = file_hash(&db);

    let err = migrate_topic_store(&db).unwrap_err();
    assert!(
        matches!(err, MigrateError::Malformed { ref topic, .. } if topic == "zz-broken"),
        "unexpected error {:?}",
        err
    );
    assert_eq!(file_hash(&db), before);
    assert!(!backup_path(db.path()).exists());
    assert_eq!(db.versions().get(VERSION_KEY).unwrap(), None);
}

#[test]
fn test_missing_v1_namespace_fails_without_changes() {
    let (_dir, db) = open_store();
    let before = file_hash(&db);

    let err = migrate_topic_store(&db).unwrap_err();
    assert!(matches!(err, MigrateError::MissingNamespace(ref ns) if ns == V1_NAMESPACE));
    assert_eq!(file_hash(&db), before);
    assert!(!backup_path(db.path()).exists());
}

#[test]
fn test_interrupted_attempt_is_recovered() {
    let (_dir, db) = open_store();
    let topics = fixture(9);
    seed_v1(&db, &topics);
    let v1_before = namespace_values(&db.store(V1_NAMESPACE));

    // Leave a backup behind, then damage the store as a crash mid-way would.
    db.with_file_detached(|path| fs::copy(path, backup_path(path)).map(|_| ()))
        .unwrap();
    db.store(V2_NAMESPACE)
        .update(|tx| tx.create_bucket(b"half-done")?.put(b"e", b"{}"))
        .unwrap();
    db.store(V1_NAMESPACE).update(|tx| tx.delete(b"cpu")).unwrap();

    migrate_topic_store(&db).unwrap();

    assert!(!backup_path(db.path()).exists());
    assert_eq!(namespace_values(&db.store(V1_NAMESPACE)), v1_before);
    let v2 = TopicBuckets::new(&db);
    assert!(!v2.topics().unwrap().contains(&"half-done".to_string()));
    assert_same_events(&v2.load_topic_bucket("cpu").unwrap(), &topics[0].event_states);
}

#[test]
fn test_stale_backup_after_completed_migration_is_discarded() {
    let (_dir, db) = open_store();
    seed_v1(&db, &fixture(10));
    migrate_topic_store(&db).unwrap();
    let hash = file_hash(&db);

    fs::write(backup_path(db.path()), b"not a database").unwrap();

    assert_eq!(migrate_topic_store(&db).unwrap(), MigrationReport::AlreadyCurrent);
    assert!(!backup_path(db.path()).exists());
    assert_eq!(file_hash(&db), hash);
}

#[test]
fn test_downgrade_reflects_v2_changes() {
    let (_dir, db) = open_store();
    let topics = fixture(11);
    seed_v1(&db, &topics);
    migrate_topic_store(&db).unwrap();

    let mut rng = rng(12);
    let added: EventState = random_event(&mut rng, 3, 3);
    let v2 = TopicBuckets::new(&db);
    v2.put_event_state("cpu", "new-event", &added).unwrap();
    v2.delete_event_state("cpu", "cpu-0000").unwrap();
    v2.delete_topic("idle").unwrap();

    migrate_v2_to_v1(&db).unwrap();

    let kv = TopicStateKv::new(&db);
    let cpu = kv.get("cpu").unwrap().unwrap();
    assert_eq!(cpu.len(), topics[0].len());
    assert!(cpu.event_states["new-event"].same_as(&added));
    assert!(!cpu.event_states.contains_key("cpu-0000"));
    // Topics without a V2 bucket keep their old V1 value.
    assert_eq!(kv.get("idle").unwrap().unwrap(), topics[2]);
    // The marker still says V2 until it is reset explicitly.
    assert_eq!(db.versions().get(VERSION_KEY).unwrap().as_deref(), Some("2"));
}
