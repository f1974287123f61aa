#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ctxvault::error::Result;
use ctxvault::store::types::{
    DecisionContent, DecisionStatus, EntryContent, KnowledgeContent, SkillContent,
};
use ctxvault::store::{ContextStore, StoreOptions};
use ctxvault::sync::{CancelFlag, SyncEngine, SyncOutcome};
use ctxvault::vcs::memory::{MemoryVcs, SharedRemote};
use ctxvault::vcs::VersionControl;
use tempfile::TempDir;

pub const PROJECT: &str = "demo";

/// Store options with a short lock wait so contention tests stay fast.
pub fn quick_options() -> StoreOptions {
    StoreOptions {
        lock_wait: Duration::from_millis(200),
        lock_lease: Duration::from_secs(60),
    }
}

/// A fresh, initialized store in a temp directory.
pub fn test_store() -> (TempDir, ContextStore) {
    let tmp = TempDir::new().unwrap();
    let store = ContextStore::init(tmp.path(), PROJECT, StoreOptions::default()).unwrap();
    (tmp, store)
}

/// One teammate's clone: a store plus a sync engine on a shared remote.
pub struct Peer {
    pub dir: TempDir,
    pub store: ContextStore,
    pub engine: SyncEngine,
}

impl Peer {
    /// Clone the remote's context branch (if any) into a new store.
    pub fn join(remote: &SharedRemote) -> Peer {
        let dir = TempDir::new().unwrap();
        let vcs = MemoryVcs::new(dir.path(), Some(remote.clone()));
        if let Some(head) = vcs.pull().unwrap() {
            vcs.fast_forward(&head).unwrap();
        }
        let store = ContextStore::init(dir.path(), PROJECT, StoreOptions::default()).unwrap();
        Peer {
            dir,
            store,
            engine: SyncEngine::new(Box::new(vcs)),
        }
    }

    /// A store with no remote at all.
    pub fn offline() -> Peer {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::init(dir.path(), PROJECT, StoreOptions::default()).unwrap();
        let engine = SyncEngine::new(Box::new(MemoryVcs::new(dir.path(), None)));
        Peer { dir, store, engine }
    }

    pub fn push(&self) -> Result<SyncOutcome> {
        self.engine.push(&self.store, &CancelFlag::new())
    }

    pub fn pull(&self) -> Result<SyncOutcome> {
        self.engine.pull(&self.store, &CancelFlag::new())
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn read_file(&self, rel: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root().join(rel)).ok()
    }
}

pub fn knowledge(key: &str, content: &str) -> EntryContent {
    EntryContent::Knowledge(KnowledgeContent {
        key: key.into(),
        content: content.into(),
    })
}

pub fn decision(title: &str, decision: &str) -> EntryContent {
    EntryContent::Decision(DecisionContent {
        title: title.into(),
        context: format!("Context for {title}"),
        decision: decision.into(),
        consequences: "To be observed".into(),
        status: DecisionStatus::Accepted,
    })
}

pub fn skill(name: &str, description: &str, instructions: &str) -> EntryContent {
    EntryContent::Skill(SkillContent {
        name: name.into(),
        description: description.into(),
        instructions: instructions.into(),
    })
}

/// Every file under `root/state` except the lock and SQLite files, by
/// relative path.
pub fn state_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let dir = root.join("state");
    let mut files = BTreeMap::new();
    let Ok(read_dir) = std::fs::read_dir(&dir) else {
        return files;
    };
    for entry in read_dir {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lock" || name.starts_with("index.db") {
            continue;
        }
        files.insert(name, std::fs::read(entry.path()).unwrap());
    }
    files
}
