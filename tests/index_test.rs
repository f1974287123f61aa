mod helpers;

use ctxvault::index::SearchIndex;
use ctxvault::store::document;
use ctxvault::store::types::EntryKind;
use helpers::{decision, knowledge, skill, test_store};

#[test]
fn incremental_index_matches_rebuild() {
    let (_tmp, store) = test_store();
    store.create(knowledge("architecture", "Hexagonal core\nPostgres adapter")).unwrap();
    store.create(decision("Use Postgres", "Postgres 16 everywhere")).unwrap();
    store.create(decision("Use Redis", "Redis for caching")).unwrap();
    store.create(skill("deploy", "Deploy the app", "kubectl apply")).unwrap();
    store
        .update(
            EntryKind::Knowledge,
            "architecture",
            knowledge("architecture", "Hexagonal core\nSQLite adapter"),
        )
        .unwrap();
    store.delete(EntryKind::Decision, "ADR-0002").unwrap();

    let incremental = store.index_snapshot().unwrap();

    let mut fresh = SearchIndex::open_in_memory().unwrap();
    fresh.rebuild(&store.list_all().unwrap()).unwrap();
    assert_eq!(incremental, fresh.snapshot().unwrap());

    store.rebuild_index().unwrap();
    assert_eq!(incremental, store.index_snapshot().unwrap());
}

#[test]
fn example_search_finds_one_decision() {
    let (_tmp, store) = test_store();
    store
        .create(knowledge("architecture", "Services talk over gRPC."))
        .unwrap();
    store
        .create(decision("Use Postgres", "Adopt Postgres as the primary database"))
        .unwrap();

    let hits = store.search("Postgres", None).unwrap();
    assert_eq!(hits.len(), 1);
    let hit = hits.iter().next().unwrap();
    assert_eq!((hit.kind, hit.id.as_str()), (EntryKind::Decision, "ADR-0001"));
    assert_eq!(hit.line, 0);
}

#[test]
fn title_matches_rank_above_body_matches() {
    let (_tmp, store) = test_store();
    store.create(knowledge("caching", "We cache with redis")).unwrap();
    store.create(skill("redis", "Operate redis", "restart it")).unwrap();

    let hits = store.search("redis", None).unwrap().into_vec();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "redis");
    assert!(hits[0].score > hits[1].score);

    let limited = store.search("redis", Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn any_term_matches_and_empty_queries_return_nothing() {
    let (_tmp, store) = test_store();
    store.create(knowledge("frontend", "React app")).unwrap();
    store.create(knowledge("backend", "Rust service")).unwrap();

    assert_eq!(store.search("react rust", None).unwrap().len(), 2);
    assert!(store.search("", None).unwrap().is_empty());
    assert!(store.search("  !! ", None).unwrap().is_empty());
}

#[test]
fn reconcile_picks_up_external_edits() {
    let (tmp, store) = test_store();
    let entry = store.create(knowledge("notes", "nothing interesting")).unwrap();

    // Edit the document behind the store's back, as a text editor would.
    let mut edited = entry.clone();
    edited.content = knowledge("notes", "mentions kubernetes now");
    edited.revision += 1;
    std::fs::write(tmp.path().join("knowledge/notes.md"), document::encode(&edited)).unwrap();
    std::fs::write(
        tmp.path().join("knowledge/extra.md"),
        document::encode(&{
            let mut extra = edited.clone();
            extra.id = "extra".into();
            extra.content = knowledge("extra", "also kubernetes");
            extra
        }),
    )
    .unwrap();

    assert!(store.search("kubernetes", None).unwrap().is_empty());
    let report = store.reconcile_index().unwrap();
    assert_eq!(report.reindexed, 2);
    assert_eq!(store.search("kubernetes", None).unwrap().len(), 2);
    assert_eq!(store.indexed_count().unwrap(), 2);
}
