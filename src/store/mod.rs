//! Context store handle: entries, manifest, and the derived search index.
//!
//! [`ContextStore`] is the single handle every operation goes through. Opening a
//! store recovers from crashes: a stale lock triggers a consistency check, and a
//! leftover sync marker forces a full index rebuild. Either way the index is
//! reconciled against the documents on disk before the handle is returned.

pub mod document;
pub mod entries;
pub mod paths;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::index::SearchIndex;
use crate::lock::{self, LockState, StoreLock};
use crate::manifest::Manifest;
use types::EntryKind;

/// Lock behavior for a store handle.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long a mutation waits for a busy lock before failing.
    pub lock_wait: Duration,
    /// Lease written into the lock file.
    pub lock_lease: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(2000),
            lock_lease: Duration::from_secs(60),
        }
    }
}

/// A document that exists on disk but does not parse.
#[derive(Debug, Clone, Serialize)]
pub struct UnparsableEntry {
    pub kind: EntryKind,
    pub path: String,
    pub error: String,
}

/// Result of [`ContextStore::check_consistency`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    pub entries_checked: usize,
    pub unparsable: Vec<UnparsableEntry>,
    pub decision_counter: u64,
    pub highest_decision: Option<u64>,
}

impl ConsistencyReport {
    /// Decision counter trails an existing ADR.
    pub fn counter_behind(&self) -> bool {
        self.highest_decision
            .is_some_and(|highest| self.decision_counter <= highest)
    }

    pub fn is_clean(&self) -> bool {
        self.unparsable.is_empty() && !self.counter_behind()
    }
}

/// Handle to one store root.
pub struct ContextStore {
    root: PathBuf,
    options: StoreOptions,
    index: Mutex<SearchIndex>,
    recovery: Option<ConsistencyReport>,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ContextStore {
    /// Create the store layout and manifest. Opening an already initialized root
    /// is not an error; the existing store is returned unchanged.
    pub fn init(root: &Path, project_name: &str, options: StoreOptions) -> Result<Self> {
        if root.join(paths::MANIFEST_FILE).exists() {
            tracing::info!(root = %root.display(), "store already initialized");
            return Self::open(root, options);
        }

        let guard = StoreLock::acquire(root, options.lock_wait, options.lock_lease)?;
        for kind in EntryKind::ALL {
            create_dir(&root.join(kind.dir_name()))?;
        }
        create_dir(&root.join(paths::SESSIONS_DIR))?;
        fsio::write_atomic(&root.join(paths::GITIGNORE_FILE), paths::GITIGNORE.as_bytes())?;
        Manifest::new(project_name).save(root, &guard)?;
        drop(guard);

        tracing::info!(root = %root.display(), project = project_name, "store initialized");
        Self::open(root, options)
    }

    /// Open an initialized store, running crash recovery when needed.
    pub fn open(root: &Path, options: StoreOptions) -> Result<Self> {
        Manifest::load(root)?;
        let stale = matches!(lock::inspect(root)?, LockState::Stale(_));
        let index = SearchIndex::open(&Self::state_path(root, paths::INDEX_FILE))?;

        let mut store = Self {
            root: root.to_path_buf(),
            options,
            index: Mutex::new(index),
            recovery: None,
        };

        if stale {
            let report = store.check_consistency()?;
            for bad in &report.unparsable {
                tracing::warn!(path = %bad.path, error = %bad.error, "unparsable entry left in place");
            }
            tracing::warn!(
                checked = report.entries_checked,
                unparsable = report.unparsable.len(),
                "recovered from stale store lock"
            );
            lock::clear(root)?;
            store.recovery = Some(report);
        }

        match store.lock() {
            Ok(guard) => store.recover(&guard)?,
            Err(StoreError::StoreBusy { holder_pid, .. }) => {
                tracing::debug!(holder_pid, "store busy, skipping index reconciliation");
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    fn recover(&self, guard: &StoreLock) -> Result<()> {
        if let Some(report) = &self.recovery {
            if report.counter_behind() {
                let next = report.highest_decision.unwrap_or(0) + 1;
                Manifest::mutate(&self.root, guard, |m| {
                    m.id_counters
                        .insert(EntryKind::Decision.as_str().to_string(), next);
                })?;
                tracing::warn!(next, "decision counter repaired");
            }
        }

        let marker = Self::state_path(&self.root, paths::SYNC_MARKER_FILE);
        let entries = self.list_all()?;
        let mut index = self.index();
        if marker.exists() {
            tracing::warn!("interrupted sync detected, rebuilding search index");
            index.rebuild(&entries)?;
            fsio::remove_if_exists(&marker)?;
        } else if index.needs_rebuild() {
            index.rebuild(&entries)?;
        } else {
            index.reconcile(&entries)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Consistency report produced when this handle recovered a stale lock.
    pub fn recovery(&self) -> Option<&ConsistencyReport> {
        self.recovery.as_ref()
    }

    /// Take the exclusive store lock with this handle's wait and lease.
    pub fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.root, self.options.lock_wait, self.options.lock_lease)
    }

    /// Current manifest, read from disk.
    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.root)
    }

    pub(crate) fn state_path(root: &Path, file: &str) -> PathBuf {
        root.join(paths::STATE_DIR).join(file)
    }

    pub(crate) fn index(&self) -> MutexGuard<'_, SearchIndex> {
        self.index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))
}
