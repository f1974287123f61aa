//! Sync engine: reconciles the working tree with the remote context branch.
//!
//! One attempt walks `Committing → Pulling → Merging → Resolving → Pushing` under
//! the store lock. Local work is committed first so nothing in the working tree
//! can be lost. Remote-only changes are adopted; changes on both sides are merged
//! where the content allows it (identical bytes, the manifest, non-overlapping
//! knowledge edits) and reported as conflicts otherwise. A conflict keeps the
//! local variant in place and writes the remote variant to a sibling conflict
//! copy. The merge is still committed with the remote head as a parent, so the
//! remote becomes the base of the next merge, but nothing is pushed while any
//! conflict stays open. Editing the local document settles its conflict.
//!
//! While remote content is being applied a marker file sits in `state/`. If the
//! process dies in between, the next [`ContextStore::open`] sees the marker and
//! rebuilds the search index from disk.

pub mod conflicts;
pub mod log;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::fsio;
use crate::lock::StoreLock;
use crate::manifest::{LastSync, Manifest};
use crate::store::document;
use crate::store::paths::{self, MANIFEST_FILE, SYNC_MARKER_FILE, TRACKED_PATHS};
use crate::store::types::{Entry, EntryContent, EntryKind, KnowledgeContent};
use crate::store::ContextStore;
use crate::vcs::{CommitRef, TextMerge, VcsError, VersionControl};

use self::conflicts::ConflictRecord;
use self::log::{SyncEvent, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Commit, pull, merge, and push.
    Push,
    /// Commit, pull, and merge; never push.
    Pull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Committing,
    Pulling,
    Merging,
    Resolving,
    Pushing,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Committing => "committing",
            Self::Pulling => "pulling",
            Self::Merging => "merging",
            Self::Resolving => "resolving",
            Self::Pushing => "pushing",
            Self::Failed => "failed",
        }
    }
}

/// Cooperative cancellation, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a successful sync did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    /// Commit created from pending local changes.
    pub committed: Option<String>,
    pub fast_forwarded: bool,
    /// Merge commit joining local and remote history.
    pub merged: Option<String>,
    /// Paths changed in the working tree by remote content.
    pub applied_paths: Vec<String>,
    /// Previously reported conflicts settled in favour of the local edit.
    pub resolved: Vec<String>,
    pub pushed: bool,
    pub local_head: Option<String>,
    pub remote_head: Option<String>,
    pub note: Option<String>,
    pub phases: Vec<SyncPhase>,
}

impl SyncOutcome {
    /// Nothing was written anywhere.
    pub fn is_noop(&self) -> bool {
        self.committed.is_none()
            && !self.fast_forwarded
            && self.merged.is_none()
            && self.applied_paths.is_empty()
            && self.resolved.is_empty()
            && !self.pushed
    }
}

/// Reconciles a store with its remote through a [`VersionControl`] backend.
pub struct SyncEngine {
    vcs: Box<dyn VersionControl>,
}

impl SyncEngine {
    pub fn new(vcs: Box<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    pub fn vcs(&self) -> &dyn VersionControl {
        self.vcs.as_ref()
    }

    /// Full sync: commit, pull, merge, push.
    pub fn push(&self, store: &ContextStore, cancel: &CancelFlag) -> Result<SyncOutcome> {
        self.run(store, SyncMode::Push, cancel)
    }

    /// Commit, pull, and merge without publishing.
    pub fn pull(&self, store: &ContextStore, cancel: &CancelFlag) -> Result<SyncOutcome> {
        self.run(store, SyncMode::Pull, cancel)
    }

    /// Run one attempt. Holds the store lock throughout.
    pub fn run(&self, store: &ContextStore, mode: SyncMode, cancel: &CancelFlag) -> Result<SyncOutcome> {
        let guard = store.lock()?;
        let mut attempt = Attempt {
            store,
            guard: &guard,
            vcs: self.vcs.as_ref(),
            cancel,
            outcome: SyncOutcome::default(),
        };

        let result = attempt.execute(mode);
        let mut outcome = attempt.outcome;
        let root = store.root();

        match result {
            Ok(()) => {
                if !outcome.is_noop() {
                    log::append(root, &event(mode, &outcome, SyncStatus::Ok, None))?;
                }
                tracing::info!(
                    mode = ?mode,
                    committed = outcome.committed.is_some(),
                    applied = outcome.applied_paths.len(),
                    pushed = outcome.pushed,
                    "sync finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                outcome.phases.push(SyncPhase::Failed);
                let status = match &err {
                    StoreError::ConflictUnresolved { .. } => SyncStatus::Conflict,
                    _ => SyncStatus::Failed,
                };
                let mut logged = event(mode, &outcome, status, Some(err.to_string()));
                if let StoreError::ConflictUnresolved { conflicts } = &err {
                    logged.conflicts = conflicts.len();
                }
                if let Err(log_err) = log::append(root, &logged) {
                    tracing::warn!(error = %log_err, "failed to record sync event");
                }
                tracing::warn!(mode = ?mode, error = %err, "sync did not complete");
                Err(err)
            }
        }
    }
}

fn event(mode: SyncMode, outcome: &SyncOutcome, status: SyncStatus, error: Option<String>) -> SyncEvent {
    SyncEvent {
        at: Utc::now(),
        mode,
        status,
        local_head: outcome.local_head.clone(),
        remote_head: outcome.remote_head.clone(),
        committed: outcome.committed.is_some(),
        applied_paths: outcome.applied_paths.len(),
        pushed: outcome.pushed,
        conflicts: 0,
        note: outcome.note.clone(),
        error,
        phases: outcome.phases.clone(),
    }
}

/// Where pulling left the two histories.
enum PullResult {
    /// No remote configured.
    NoRemote,
    /// Remote has no context branch yet, or local already contains it.
    UpToDate { remote: Option<CommitRef> },
    /// Remote content was applied (fast-forward or merge).
    Integrated { remote: CommitRef },
}

/// One planned change to the working tree.
enum Change {
    Write(Vec<u8>),
    Delete,
}

struct Attempt<'a> {
    store: &'a ContextStore,
    guard: &'a StoreLock,
    vcs: &'a dyn VersionControl,
    cancel: &'a CancelFlag,
    outcome: SyncOutcome,
}

impl Attempt<'_> {
    fn execute(&mut self, mode: SyncMode) -> Result<()> {
        self.enter(SyncPhase::Committing)?;
        self.commit_local()?;
        self.settle_resolved()?;

        let mut retried_push = false;
        loop {
            self.enter(SyncPhase::Pulling)?;
            let remote = match self.pull_and_merge()? {
                PullResult::NoRemote => {
                    self.outcome.note = Some("no remote configured; changes kept locally".into());
                    return self.finish(None);
                }
                PullResult::UpToDate { remote } => remote,
                PullResult::Integrated { remote } => Some(remote),
            };
            self.outcome.remote_head = remote.as_ref().map(|r| r.to_string());
            self.ensure_no_conflicts()?;

            if mode == SyncMode::Pull || !self.ahead_of(remote.as_ref())? {
                return self.finish(remote.as_ref());
            }

            self.enter(SyncPhase::Pushing)?;
            match self.vcs.push() {
                Ok(()) => {
                    self.outcome.pushed = true;
                    let head = self.vcs.head()?;
                    self.outcome.remote_head = head.as_ref().map(|h| h.to_string());
                    return self.finish(head.as_ref());
                }
                Err(VcsError::RemoteRejected(msg) | VcsError::Network(msg)) if !retried_push => {
                    tracing::info!(reason = %msg, "push failed, pulling again before one retry");
                    retried_push = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record a phase transition after checking for cancellation and renewing the
    /// lock lease.
    fn enter(&mut self, phase: SyncPhase) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled(phase.as_str()));
        }
        self.guard.renew()?;
        tracing::debug!(phase = phase.as_str(), "sync phase");
        self.outcome.phases.push(phase);
        Ok(())
    }

    fn finish(&mut self, synced_with: Option<&CommitRef>) -> Result<()> {
        self.outcome.local_head = self.vcs.head()?.map(|h| h.to_string());
        if let Some(remote) = synced_with {
            if !self.outcome.is_noop() {
                Manifest::record_sync(
                    self.store.root(),
                    self.guard,
                    &LastSync {
                        remote_ref: remote.to_string(),
                        at: Utc::now(),
                    },
                )?;
            }
        }
        self.outcome.phases.push(SyncPhase::Idle);
        Ok(())
    }

    /// Drop conflict records whose local document was edited since the conflict
    /// was reported. The edit has just been committed and is what gets pushed.
    fn settle_resolved(&mut self) -> Result<()> {
        let root = self.store.root();
        let records = conflicts::load(root)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut open = Vec::with_capacity(records.len());
        for record in records {
            let current = fsio::read_optional(&root.join(&record.path))?;
            if record.resolved_by_local(current.as_deref()) {
                tracing::info!(kind = %record.kind, id = %record.id, "conflict resolved by local edit");
                conflicts::remove_copy(root, &record.path)?;
                self.outcome.resolved.push(record.path);
            } else {
                open.push(record);
            }
        }
        conflicts::save(root, &open)
    }

    fn commit_local(&mut self) -> Result<()> {
        let project = self.store.manifest()?.project_name;
        if let Some(commit) = self
            .vcs
            .commit(&tracked_paths(), &format!("ctxvault: update {project} context"))?
        {
            tracing::info!(commit = commit.short(), "committed local changes");
            self.outcome.committed = Some(commit.to_string());
        }
        Ok(())
    }

    /// Whether local history contains commits the remote lacks.
    fn ahead_of(&self, remote: Option<&CommitRef>) -> Result<bool> {
        let Some(local) = self.vcs.head()? else {
            return Ok(false);
        };
        match remote {
            None => Ok(true),
            Some(remote) if *remote == local => Ok(false),
            Some(remote) => Ok(self.vcs.merge_base(&local, remote)?.as_ref() == Some(remote)),
        }
    }

    fn pull_with_retry(&self) -> Result<Option<CommitRef>> {
        match self.vcs.pull() {
            Err(VcsError::Network(msg)) => {
                tracing::info!(reason = %msg, "pull failed, retrying once");
                Ok(self.vcs.pull()?)
            }
            other => Ok(other?),
        }
    }

    fn pull_and_merge(&mut self) -> Result<PullResult> {
        let remote = match self.pull_with_retry() {
            Err(StoreError::Vcs(VcsError::NoRemote)) => return Ok(PullResult::NoRemote),
            Err(e) => return Err(e),
            Ok(None) => return Ok(PullResult::UpToDate { remote: None }),
            Ok(Some(remote)) => remote,
        };

        let local = self.vcs.head()?;
        let base = match &local {
            Some(local) if *local == remote => {
                return Ok(PullResult::UpToDate { remote: Some(remote) })
            }
            Some(local) => self.vcs.merge_base(local, &remote)?,
            None => None,
        };

        if base.as_ref() == Some(&remote) {
            return Ok(PullResult::UpToDate { remote: Some(remote) });
        }

        self.enter(SyncPhase::Merging)?;
        match local {
            Some(local) if base.as_ref() != Some(&local) => self.merge(base, local, remote),
            _ => self.fast_forward(local, remote),
        }
    }

    fn fast_forward(&mut self, local: Option<CommitRef>, remote: CommitRef) -> Result<PullResult> {
        let changed = self.vcs.diff_paths(local.as_ref(), &remote)?;
        self.write_marker(&remote)?;
        self.vcs.fast_forward(&remote)?;
        self.store.reindex_paths(&changed)?;

        // Local history is contained in the remote, so no local variant is left
        // to conflict with.
        for record in conflicts::load(self.store.root())? {
            conflicts::remove_copy(self.store.root(), &record.path)?;
        }
        conflicts::save(self.store.root(), &[])?;
        self.clear_marker()?;

        tracing::info!(to = remote.short(), paths = changed.len(), "fast-forwarded to remote");
        self.outcome.fast_forwarded = true;
        self.outcome.applied_paths.extend(changed);
        Ok(PullResult::Integrated { remote })
    }

    fn merge(&mut self, base: Option<CommitRef>, local: CommitRef, remote: CommitRef) -> Result<PullResult> {
        let ours_changed = self.vcs.diff_paths(base.as_ref(), &local)?;
        let theirs_changed = self.vcs.diff_paths(base.as_ref(), &remote)?;
        let records = conflicts::load(self.store.root())?;

        let mut changes: Vec<(String, Change)> = Vec::new();
        let mut conflicted: Vec<(ConflictRecord, Vec<u8>)> = Vec::new();
        let mut settled: Vec<String> = Vec::new();

        for path in &theirs_changed {
            let theirs = self.vcs.read_at(&remote, path)?;
            // An open conflict is never overwritten or merged away by a later
            // remote edit; the remote variant is only refreshed.
            let open = records.iter().any(|r| r.path == *path);
            if !open && !ours_changed.contains(path) {
                changes.push((path.clone(), to_change(theirs)));
                continue;
            }

            let ours = self.vcs.read_at(&local, path)?;
            if ours == theirs {
                if open {
                    settled.push(path.clone());
                }
                continue;
            }
            let base_bytes = match &base {
                Some(base) => self.vcs.read_at(base, path)?,
                None => None,
            };

            if path == MANIFEST_FILE {
                let merged = merge_manifests(base_bytes.as_deref(), ours.as_deref(), theirs.as_deref())?;
                changes.push((path.clone(), Change::Write(merged)));
                continue;
            }

            let Some((kind, id)) = paths::classify(path) else {
                // Not an entry: take a clean text merge, otherwise keep ours.
                if let Some(merged) = self.merge_plain(base_bytes.as_deref(), ours.as_deref(), theirs.as_deref())? {
                    changes.push((path.clone(), Change::Write(merged)));
                } else {
                    tracing::warn!(path = %path, "concurrent edits to non-entry file, keeping local");
                }
                continue;
            };

            let (ours, theirs) = match (ours, theirs) {
                // Local deletion against a remote edit: keep the edit.
                (None, Some(theirs)) => {
                    changes.push((path.clone(), Change::Write(theirs)));
                    continue;
                }
                // Remote deletion against a local edit: keep the local entry.
                (Some(_), None) | (None, None) => continue,
                (Some(ours), Some(theirs)) => (ours, theirs),
            };

            if !open && kind == EntryKind::Knowledge {
                if let Some(merged) = self.merge_knowledge(&id, base_bytes.as_deref(), &ours, &theirs)? {
                    changes.push((path.clone(), Change::Write(merged)));
                    continue;
                }
            }

            conflicted.push((
                ConflictRecord {
                    path: path.clone(),
                    kind,
                    id,
                    remote_ref: remote.to_string(),
                    remote_digest: conflicts::digest_of(Some(&theirs)),
                    local_digest: conflicts::digest_of(Some(&ours)),
                    detected_at: Utc::now(),
                },
                theirs,
            ));
        }

        self.apply(&remote, changes, &records, &settled, conflicted)?;

        let commit = self.vcs.commit_merge(
            &tracked_paths(),
            &format!("ctxvault: merge remote context {}", remote.short()),
            &remote,
        )?;
        tracing::info!(commit = commit.short(), remote = remote.short(), "merged remote context");
        self.outcome.merged = Some(commit.to_string());
        Ok(PullResult::Integrated { remote })
    }

    /// Write planned changes and conflict copies, update the index, and persist
    /// the new conflict record set: open records not touched by this merge,
    /// plus the conflicts it found.
    fn apply(
        &mut self,
        remote: &CommitRef,
        changes: Vec<(String, Change)>,
        previous: &[ConflictRecord],
        settled: &[String],
        conflicted: Vec<(ConflictRecord, Vec<u8>)>,
    ) -> Result<()> {
        let root = self.store.root().to_path_buf();
        let mut records: Vec<ConflictRecord> = previous
            .iter()
            .filter(|p| !settled.contains(&p.path))
            .filter(|p| !conflicted.iter().any(|(r, _)| r.path == p.path))
            .cloned()
            .collect();

        if !changes.is_empty() || !conflicted.is_empty() || !settled.is_empty() {
            self.write_marker(remote)?;
        }

        let mut applied = BTreeSet::new();
        for (path, change) in changes {
            let full = root.join(&path);
            let differs = match &change {
                Change::Write(bytes) => fsio::read_optional(&full)?.as_deref() != Some(bytes.as_slice()),
                Change::Delete => full.exists(),
            };
            if !differs {
                continue;
            }
            match change {
                Change::Write(bytes) => fsio::write_atomic(&full, &bytes)?,
                Change::Delete => {
                    fsio::remove_if_exists(&full)?;
                    if let Some(parent) = full.parent() {
                        fsio::remove_empty_dir(parent);
                    }
                }
            }
            applied.insert(path);
        }
        self.store.reindex_paths(&applied)?;
        self.outcome.applied_paths.extend(applied);

        if !conflicted.is_empty() {
            self.enter(SyncPhase::Resolving)?;
        }
        for (record, theirs) in conflicted {
            conflicts::write_copy(&root, &record.path, &theirs)?;
            // Keep the original detection time for a conflict that is still the same.
            let record = match previous.iter().find(|p| {
                p.path == record.path
                    && p.remote_digest == record.remote_digest
                    && p.local_digest == record.local_digest
            }) {
                Some(prev) => prev.clone(),
                None => record,
            };
            tracing::warn!(kind = %record.kind, id = %record.id, "sync conflict");
            records.push(record);
        }

        for stale in previous.iter().filter(|p| !records.iter().any(|r| r.path == p.path)) {
            conflicts::remove_copy(&root, &stale.path)?;
        }
        self.outcome.resolved.extend(settled.iter().cloned());
        conflicts::save(&root, &records)?;

        self.clear_marker()?;
        Ok(())
    }

    /// Refuse to go further while any conflict is open.
    fn ensure_no_conflicts(&self) -> Result<()> {
        let records = conflicts::load(self.store.root())?;
        if records.is_empty() {
            return Ok(());
        }
        Err(StoreError::ConflictUnresolved {
            conflicts: records.iter().map(ConflictRecord::report).collect(),
        })
    }

    /// Merge two knowledge documents by their body text. Header fields take the
    /// newer timestamps and a revision above both sides.
    fn merge_knowledge(
        &self,
        id: &str,
        base: Option<&[u8]>,
        ours: &[u8],
        theirs: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let parse = |bytes: &[u8]| {
            document::parse(EntryKind::Knowledge, id, &String::from_utf8_lossy(bytes)).ok()
        };
        let (Some(ours), Some(theirs)) = (parse(ours), parse(theirs)) else {
            return Ok(None);
        };
        let base_body = base
            .and_then(parse)
            .map(|e| knowledge_body(&e).to_string())
            .unwrap_or_default();

        let merged = match self.vcs.merge_text(&base_body, knowledge_body(&ours), knowledge_body(&theirs))? {
            TextMerge::Clean(text) => text,
            TextMerge::Conflicted => return Ok(None),
        };

        let entry = Entry {
            id: ours.id.clone(),
            kind: EntryKind::Knowledge,
            content: EntryContent::Knowledge(KnowledgeContent {
                key: ours.id.clone(),
                content: merged,
            }),
            created_at: ours.created_at.min(theirs.created_at),
            updated_at: ours.updated_at.max(theirs.updated_at),
            revision: ours.revision.max(theirs.revision) + 1,
        };
        Ok(Some(document::encode(&entry).into_bytes()))
    }

    fn merge_plain(
        &self,
        base: Option<&[u8]>,
        ours: Option<&[u8]>,
        theirs: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>> {
        let (Some(ours), Some(theirs)) = (ours, theirs) else {
            return Ok(None);
        };
        let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        match self.vcs.merge_text(&base.map(text).unwrap_or_default(), &text(ours), &text(theirs))? {
            TextMerge::Clean(merged) => Ok(Some(merged.into_bytes())),
            TextMerge::Conflicted => Ok(None),
        }
    }

    fn write_marker(&self, remote: &CommitRef) -> Result<()> {
        let marker = serde_json::json!({
            "pid": std::process::id(),
            "remote": remote.as_str(),
            "started_at": Utc::now(),
        });
        fsio::write_atomic(&marker_path(self.store.root()), &serde_json::to_vec(&marker)?)
    }

    fn clear_marker(&self) -> Result<()> {
        fsio::remove_if_exists(&marker_path(self.store.root()))?;
        Ok(())
    }
}

fn marker_path(root: &Path) -> std::path::PathBuf {
    ContextStore::state_path(root, SYNC_MARKER_FILE)
}

fn tracked_paths() -> Vec<String> {
    TRACKED_PATHS.iter().map(|p| p.to_string()).collect()
}

fn to_change(bytes: Option<Vec<u8>>) -> Change {
    match bytes {
        Some(bytes) => Change::Write(bytes),
        None => Change::Delete,
    }
}

fn knowledge_body(entry: &Entry) -> &str {
    match &entry.content {
        EntryContent::Knowledge(k) => &k.content,
        _ => "",
    }
}

fn merge_manifests(base: Option<&[u8]>, ours: Option<&[u8]>, theirs: Option<&[u8]>) -> Result<Vec<u8>> {
    let origin = Path::new(MANIFEST_FILE);
    let parse = |bytes: Option<&[u8]>| bytes.map(|b| Manifest::parse(b, origin)).transpose();

    let base = parse(base)?;
    let merged = match (parse(ours)?, parse(theirs)?) {
        (Some(ours), Some(theirs)) => Manifest::merge(base.as_ref(), &ours, &theirs),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => {
            return Err(StoreError::CorruptManifest {
                path: origin.to_path_buf(),
                reason: "manifest missing on both sides of a merge".into(),
            })
        }
    };
    merged.to_bytes()
}
