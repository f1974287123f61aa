//! End-to-end sync over real git repositories. Skipped when `git` is missing.

mod helpers;

use std::path::Path;
use std::process::Command;

use ctxvault::store::types::{EntryContent, EntryKind};
use ctxvault::store::{ContextStore, StoreOptions};
use ctxvault::sync::{CancelFlag, SyncEngine};
use ctxvault::vcs::git::GitCli;
use ctxvault::vcs::VersionControl;
use helpers::{decision, knowledge, PROJECT};
use tempfile::TempDir;

const BRANCH: &str = "ctx/context";

struct Checkout {
    dir: TempDir,
    store: ContextStore,
    engine: SyncEngine,
}

impl Checkout {
    fn new(remote: &Path) -> Checkout {
        let dir = TempDir::new().unwrap();
        let git = GitCli::new(dir.path(), BRANCH, "origin").with_author("Test", "test@example.com");
        git.init().unwrap();
        git.set_remote_url(&remote.display().to_string()).unwrap();
        if let Some(head) = git.pull().unwrap() {
            git.fast_forward(&head).unwrap();
        }
        let store = ContextStore::init(dir.path(), PROJECT, StoreOptions::default()).unwrap();
        Checkout {
            dir,
            store,
            engine: SyncEngine::new(Box::new(git)),
        }
    }

    fn push(&self) -> ctxvault::error::Result<ctxvault::sync::SyncOutcome> {
        self.engine.push(&self.store, &CancelFlag::new())
    }

    fn pull(&self) -> ctxvault::error::Result<ctxvault::sync::SyncOutcome> {
        self.engine.pull(&self.store, &CancelFlag::new())
    }
}

fn bare_remote() -> Option<TempDir> {
    if !GitCli::is_available() {
        eprintln!("git not available, skipping");
        return None;
    }
    let dir = TempDir::new().unwrap();
    let status = Command::new("git")
        .args(["init", "-q", "--bare"])
        .arg(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    Some(dir)
}

#[test]
fn teammates_exchange_context_over_git() {
    let Some(remote) = bare_remote() else { return };

    let alice = Checkout::new(remote.path());
    alice.store.create(knowledge("architecture", "one\ntwo\nthree\nfour\nfive")).unwrap();
    let first = alice.push().unwrap();
    assert!(first.pushed);

    let bob = Checkout::new(remote.path());
    assert!(bob.store.read(EntryKind::Knowledge, "architecture").is_ok());
    assert_eq!(bob.store.search("three", None).unwrap().len(), 1);

    alice.store.create(decision("Use Postgres", "Postgres")).unwrap();
    alice.push().unwrap();

    bob.store
        .update(
            EntryKind::Knowledge,
            "architecture",
            knowledge("architecture", "one\ntwo\nthree\nfour\nFIVE"),
        )
        .unwrap();
    let merged = bob.push().unwrap();
    assert!(merged.merged.is_some());
    assert!(merged.pushed);

    let pulled = alice.pull().unwrap();
    assert!(pulled.fast_forwarded);
    match alice.store.read(EntryKind::Knowledge, "architecture").unwrap().content {
        EntryContent::Knowledge(k) => assert!(k.content.ends_with("FIVE")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(bob.store.read(EntryKind::Decision, "ADR-0001").is_ok());

    // Local bookkeeping never reaches the remote.
    let head = alice.engine.vcs().head().unwrap().unwrap();
    assert!(alice.engine.vcs().read_at(&head, "state/sync.log.jsonl").unwrap().is_none());
    assert!(alice.engine.vcs().read_at(&head, "manifest.json").unwrap().is_some());
    assert!(alice.dir.path().join(".gitignore").exists());
}

#[test]
fn second_push_over_git_is_a_noop() {
    let Some(remote) = bare_remote() else { return };

    let alice = Checkout::new(remote.path());
    alice.store.create(knowledge("notes", "x")).unwrap();
    alice.push().unwrap();

    assert!(alice.push().unwrap().is_noop());
    assert!(alice.pull().unwrap().is_noop());
}
