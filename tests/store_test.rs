mod helpers;

use std::sync::Arc;

use ctxvault::error::StoreError;
use ctxvault::store::types::{EntryContent, EntryKind};
use ctxvault::store::{ContextStore, StoreOptions};
use helpers::{decision, knowledge, skill, test_store};

#[test]
fn create_then_read_round_trips() {
    let (_tmp, store) = test_store();

    for content in [
        knowledge("architecture", "Hexagonal.\n\nPorts and adapters."),
        decision("Use Postgres", "We use Postgres 16"),
        skill("deploy-staging", "Deploy to staging", "1. make build\n2. make deploy"),
    ] {
        let created = store.create(content).unwrap();
        assert_eq!(created.revision, 1);
        let read = store.read(created.kind, &created.id).unwrap();
        assert_eq!(read, created);
    }

    assert_eq!(store.list_all().unwrap().len(), 3);
}

#[test]
fn update_bumps_revision_and_keeps_created_at() {
    let (_tmp, store) = test_store();
    let first = store.create(knowledge("conventions", "tabs")).unwrap();

    let second = store
        .update(EntryKind::Knowledge, "conventions", knowledge("conventions", "spaces"))
        .unwrap();

    assert_eq!(second.revision, 2);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(store.read(EntryKind::Knowledge, "conventions").unwrap(), second);
}

#[test]
fn update_cannot_rename() {
    let (_tmp, store) = test_store();
    store.create(knowledge("old", "x")).unwrap();

    let err = store
        .update(EntryKind::Knowledge, "old", knowledge("new", "x"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));
    assert!(store.read(EntryKind::Knowledge, "old").is_ok());
}

#[test]
fn delete_then_read_is_not_found() {
    let (_tmp, store) = test_store();
    store.create(skill("lint", "Run lints", "cargo clippy")).unwrap();

    store.delete(EntryKind::Skill, "lint").unwrap();

    assert!(matches!(
        store.read(EntryKind::Skill, "lint"),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete(EntryKind::Skill, "lint"),
        Err(StoreError::NotFound { .. })
    ));
    assert!(store.search("clippy", None).unwrap().is_empty());
}

#[test]
fn duplicate_keys_are_rejected() {
    let (_tmp, store) = test_store();
    store.create(knowledge("architecture", "a")).unwrap();

    let err = store.create(knowledge("architecture", "b")).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateId { kind: EntryKind::Knowledge, .. }));
    assert_eq!(
        store.read(EntryKind::Knowledge, "architecture").unwrap().content,
        knowledge("architecture", "a")
    );
}

#[test]
fn invalid_payloads_write_nothing() {
    let (tmp, store) = test_store();

    for bad in [
        knowledge("Not A Slug", "x"),
        knowledge("../escape", "x"),
        knowledge("empty", "   "),
        decision("", "something"),
        decision("Two\nlines", "something"),
        skill("deploy", "", "steps"),
    ] {
        assert!(
            matches!(store.create(bad.clone()), Err(StoreError::Validation { .. })),
            "accepted {bad:?}"
        );
    }

    assert!(store.list_all().unwrap().is_empty());
    assert_eq!(store.manifest().unwrap().next_number(EntryKind::Decision), 1);
    assert!(!tmp.path().join("escape.md").exists());
}

#[test]
fn decision_ids_are_never_reused() {
    let (_tmp, store) = test_store();
    let first = store.create(decision("One", "1")).unwrap();
    let second = store.create(decision("Two", "2")).unwrap();
    assert_eq!((first.id.as_str(), second.id.as_str()), ("ADR-0001", "ADR-0002"));

    store.delete(EntryKind::Decision, "ADR-0002").unwrap();
    let third = store.create(decision("Three", "3")).unwrap();
    assert_eq!(third.id, "ADR-0003");

    // Ids are case-insensitive on read.
    assert_eq!(store.read(EntryKind::Decision, "adr-0001").unwrap().id, "ADR-0001");
}

#[test]
fn concurrent_handles_allocate_distinct_ids() {
    let tmp = tempfile::TempDir::new().unwrap();
    ContextStore::init(tmp.path(), "demo", StoreOptions::default()).unwrap();
    let options = StoreOptions {
        lock_wait: std::time::Duration::from_secs(10),
        ..StoreOptions::default()
    };
    let a = Arc::new(ContextStore::open(tmp.path(), options).unwrap());
    let b = Arc::new(ContextStore::open(tmp.path(), options).unwrap());

    let handles: Vec<_> = [a, b]
        .into_iter()
        .enumerate()
        .map(|(n, store)| {
            std::thread::spawn(move || {
                (0..5)
                    .map(|i| store.create(decision(&format!("D{n}-{i}"), "x")).unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort();
    let expected: Vec<String> = (1..=10).map(|n| format!("ADR-{n:04}")).collect();
    assert_eq!(ids, expected);
}

#[test]
fn skill_names_are_case_insensitive() {
    let (_tmp, store) = test_store();
    let created = store
        .create(skill("Deploy-Staging", "Deploy to staging", "make deploy"))
        .unwrap();
    assert_eq!(created.id, "deploy-staging");
    match &created.content {
        EntryContent::Skill(s) => assert_eq!(s.name, "deploy-staging"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        store.create(skill("deploy-staging", "again", "x")),
        Err(StoreError::DuplicateId { .. })
    ));
}

#[test]
fn reads_see_writes_from_other_handles() {
    let (tmp, store) = test_store();
    let other = ContextStore::open(tmp.path(), StoreOptions::default()).unwrap();

    other.create(knowledge("shared", "from the other handle")).unwrap();

    let entry = store.read(EntryKind::Knowledge, "shared").unwrap();
    assert_eq!(entry.content, knowledge("shared", "from the other handle"));
}
